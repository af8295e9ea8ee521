//! Platform facility abstractions.
//!
//! The ringing path needs four host facilities: CPU wake reservations,
//! alarm-class audio focus, vibration, and a user-visible ringing
//! notification. Each is a trait so the core stays host-agnostic; the
//! in-process implementations in [`stub`] are used by the daemon and by
//! tests on every platform.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub mod stub;

/// Grants time-bounded exclusive CPU wake reservations.
pub trait WakeSource: Send + Sync {
    /// Acquire a wake reservation with a hard upper bound on how long it
    /// may be held. The platform enforces `max_hold` as a safety net; the
    /// caller is expected to release well before it.
    fn acquire(&self, tag: &str, max_hold: Duration) -> WakeGuard;
}

/// A held wake reservation. Released on drop, on every exit path.
pub struct WakeGuard {
    tag: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl WakeGuard {
    /// Build a guard around a release hook.
    pub fn new(tag: impl Into<String>, release: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            tag: tag.into(),
            release: Some(release),
        }
    }

    /// Release the reservation explicitly.
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            debug!("released wake reservation '{}'", self.tag);
        }
    }
}

impl Drop for WakeGuard {
    fn drop(&mut self) {
        self.run_release();
    }
}

/// Brokers alarm-class audio focus among competing audio sources.
pub trait AudioFocus: Send + Sync {
    /// Request transient alarm-class focus. Denial is reported as an
    /// error, but callers on the ringing path proceed regardless —
    /// alarms have priority over focus etiquette.
    fn request_alarm_focus(&self) -> crate::Result<FocusGrant>;
}

/// A held audio-focus grant. Abandoned on drop.
pub struct FocusGrant {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl FocusGrant {
    /// Build a grant around a release hook.
    pub fn new(release: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            release: Some(release),
        }
    }
}

impl Drop for FocusGrant {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            debug!("abandoned audio focus grant");
        }
    }
}

/// Repeating-waveform vibration capability.
pub trait Vibrator: Send + Sync {
    /// Whether the host has a vibration capability at all.
    fn has_vibrator(&self) -> bool;

    /// Start repeating the given on/off waveform until [`cancel`](Self::cancel).
    fn start_waveform(&self, pattern_ms: &[u64]) -> crate::Result<()>;

    /// Stop vibrating. Safe to call when not vibrating.
    fn cancel(&self);
}

/// The persistent, high-priority ringing notification.
pub trait RingingNotifier: Send + Sync {
    /// Show the non-dismissible ringing notification with dismiss/snooze
    /// actions for the given alarm.
    fn show_ringing(&self, id: &str, label: &str) -> crate::Result<()>;

    /// Clear the ringing notification. Safe to call when none is shown.
    fn clear(&self);
}

/// Bundle of platform facilities handed to the trigger and session layers.
#[derive(Clone)]
pub struct Platform {
    /// Wake reservation source.
    pub wake: Arc<dyn WakeSource>,
    /// Audio focus broker.
    pub focus: Arc<dyn AudioFocus>,
    /// Vibration capability.
    pub vibrator: Arc<dyn Vibrator>,
    /// Ringing notification surface.
    pub notifier: Arc<dyn RingingNotifier>,
}

/// Create the in-process platform bundle.
#[must_use]
pub fn host_platform() -> Platform {
    Platform {
        wake: Arc::new(stub::InProcessWakeSource::new()),
        focus: Arc::new(stub::AlwaysGrantedFocus),
        vibrator: Arc::new(stub::NoVibrator),
        notifier: Arc::new(stub::LogNotifier::new()),
    }
}
