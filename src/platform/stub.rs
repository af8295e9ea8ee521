//! In-process platform facility implementations.
//!
//! These stand in for host-OS power, audio-focus, vibration, and
//! notification services when running as a plain process. The wake source
//! tracks held reservations so diagnostics and tests can observe balance;
//! the rest reduce to structured log lines.

use super::{AudioFocus, FocusGrant, RingingNotifier, Vibrator, WakeGuard, WakeSource};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Wake source that tracks reservation balance in-process.
pub struct InProcessWakeSource {
    active: Arc<AtomicUsize>,
}

impl InProcessWakeSource {
    /// Create a wake source with zero held reservations.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of currently held reservations.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl Default for InProcessWakeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl WakeSource for InProcessWakeSource {
    fn acquire(&self, tag: &str, max_hold: Duration) -> WakeGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        debug!("acquired wake reservation '{tag}' (max hold {max_hold:?})");
        let active = Arc::clone(&self.active);
        WakeGuard::new(
            tag,
            Box::new(move || {
                active.fetch_sub(1, Ordering::SeqCst);
            }),
        )
    }
}

/// Focus broker that always grants alarm-class focus.
pub struct AlwaysGrantedFocus;

impl AudioFocus for AlwaysGrantedFocus {
    fn request_alarm_focus(&self) -> crate::Result<FocusGrant> {
        debug!("alarm audio focus granted");
        Ok(FocusGrant::new(Box::new(|| {})))
    }
}

/// Vibrator for hosts without a vibration capability.
pub struct NoVibrator;

impl Vibrator for NoVibrator {
    fn has_vibrator(&self) -> bool {
        false
    }

    fn start_waveform(&self, _pattern_ms: &[u64]) -> crate::Result<()> {
        Err(crate::AlarmError::Playback(
            "no vibration capability on this host".into(),
        ))
    }

    fn cancel(&self) {}
}

/// Notifier that surfaces the ringing notification as log lines.
pub struct LogNotifier {
    shown: AtomicUsize,
}

impl LogNotifier {
    /// Create a notifier with nothing shown.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shown: AtomicUsize::new(0),
        }
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RingingNotifier for LogNotifier {
    fn show_ringing(&self, id: &str, label: &str) -> crate::Result<()> {
        self.shown.store(1, Ordering::SeqCst);
        info!("ringing notification shown for alarm '{id}': {label} [dismiss | snooze]");
        Ok(())
    }

    fn clear(&self) {
        if self.shown.swap(0, Ordering::SeqCst) != 0 {
            info!("ringing notification cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_source_balance_returns_to_zero() {
        let source = InProcessWakeSource::new();
        {
            let _a = source.acquire("a", Duration::from_secs(60));
            let _b = source.acquire("b", Duration::from_secs(60));
            assert_eq!(source.active_count(), 2);
        }
        assert_eq!(source.active_count(), 0);
    }

    #[test]
    fn focus_is_always_granted() {
        let focus = AlwaysGrantedFocus;
        assert!(focus.request_alarm_focus().is_ok());
    }

    #[test]
    fn no_vibrator_refuses_waveforms() {
        let vibrator = NoVibrator;
        assert!(vibrator.start_waveform(&[1_000, 500]).is_err());
    }

    #[test]
    fn log_notifier_show_and_clear() {
        let notifier = LogNotifier::new();
        notifier.show_ringing("a1", "Wake").expect("show");
        notifier.clear();
        notifier.clear();
    }
}
