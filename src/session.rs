//! Ringing session state machine.
//!
//! [`PlaybackSession`] is the single owner of every ringing resource:
//! wake reservation, audio focus, audio engine, vibration, and the
//! ringing notification. At most one session is non-idle process-wide;
//! a trigger for a different alarm while one is ringing tears the old
//! session fully down before the new one starts (last-trigger-wins).

use crate::audio::{AlarmSounder, RingingHandle, SoundSource, source};
use crate::config::{AlarmConfig, AudioConfig, SessionConfig};
use crate::facade::AlarmScheduler;
use crate::platform::{FocusGrant, Platform, WakeGuard};
use crate::registrar::now_epoch_millis;
use crate::store::AlarmRecord;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No alarm is ringing.
    Idle,
    /// Resources are being acquired for a fired alarm.
    Starting,
    /// The alarm is audibly/visibly ringing.
    Ringing,
    /// Resources are being released.
    Stopping,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Ringing => write!(f, "ringing"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// Resources owned by one ringing alarm.
struct ActiveRing {
    alarm_id: String,
    label: String,
    audio: Option<Box<dyn RingingHandle>>,
    vibrating: bool,
    focus: Option<FocusGrant>,
    wake: Option<WakeGuard>,
}

/// Owner of the one-and-only ringing session.
pub struct PlaybackSession {
    active: tokio::sync::Mutex<Option<ActiveRing>>,
    snapshot: std::sync::Mutex<(SessionState, Option<String>)>,
    platform: Platform,
    sounder: Arc<dyn AlarmSounder>,
    scheduler: Arc<AlarmScheduler>,
    session: SessionConfig,
    audio: AudioConfig,
}

impl PlaybackSession {
    /// Create the session owner.
    pub fn new(
        platform: Platform,
        sounder: Arc<dyn AlarmSounder>,
        scheduler: Arc<AlarmScheduler>,
        config: &AlarmConfig,
    ) -> Self {
        Self {
            active: tokio::sync::Mutex::new(None),
            snapshot: std::sync::Mutex::new((SessionState::Idle, None)),
            platform,
            sounder,
            scheduler,
            session: config.session.clone(),
            audio: config.audio.clone(),
        }
    }

    /// Current state and active alarm id.
    #[must_use]
    pub fn current(&self) -> (SessionState, Option<String>) {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_snapshot(&self, state: SessionState, alarm_id: Option<String>) {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        *snapshot = (state, alarm_id);
    }

    /// Start ringing for a fired alarm.
    ///
    /// If another alarm is ringing, its session is fully stopped first;
    /// the new session never coexists with the old one's resources.
    pub async fn start(&self, id: &str, label: &str) {
        let mut active = self.active.lock().await;

        if let Some(previous) = active.take() {
            info!(
                "alarm '{}' supersedes ringing alarm '{}'",
                id, previous.alarm_id
            );
            self.teardown(previous);
        }

        self.set_snapshot(SessionState::Starting, Some(id.to_owned()));
        info!("starting ringing session for alarm '{id}'");

        // Resource acquisition order: wake reservation, audio focus,
        // audio engine, vibration, notification.
        let wake = self.platform.wake.acquire(
            &format!("ringing:{id}"),
            Duration::from_secs(self.session.wake_hold_secs),
        );

        let focus = match self.platform.focus.request_alarm_focus() {
            Ok(grant) => Some(grant),
            Err(e) => {
                // Alarms ring regardless of focus outcome.
                warn!("audio focus not granted, ringing anyway: {e}");
                None
            }
        };

        let audio = self.start_audio_with_fallback(id);

        let vibrating = if self.platform.vibrator.has_vibrator() {
            match self
                .platform
                .vibrator
                .start_waveform(&self.session.vibration_pattern_ms)
            {
                Ok(()) => true,
                Err(e) => {
                    warn!("vibration failed for alarm '{id}': {e}");
                    false
                }
            }
        } else {
            false
        };

        if audio.is_none() && !vibrating {
            // Degraded but never silent-failure: the notification still
            // surfaces the ringing alarm.
            error!("alarm '{id}' is ringing without audio or vibration");
        }

        if let Err(e) = self.platform.notifier.show_ringing(id, label) {
            warn!("cannot show ringing notification for alarm '{id}': {e}");
        }

        *active = Some(ActiveRing {
            alarm_id: id.to_owned(),
            label: label.to_owned(),
            audio,
            vibrating,
            focus,
            wake: Some(wake),
        });
        self.set_snapshot(SessionState::Ringing, Some(id.to_owned()));
        info!("alarm '{id}' is ringing");
    }

    /// Walk the sound fallback chain until one source plays.
    fn start_audio_with_fallback(&self, id: &str) -> Option<Box<dyn RingingHandle>> {
        let ready_timeout = Duration::from_millis(self.session.audio_ready_timeout_ms);

        let mut chain = Vec::new();
        if let Some(path) = &self.audio.sound_path {
            chain.push(SoundSource::File(path.clone()));
        }
        chain.push(SoundSource::BuiltinAlarm);
        chain.push(SoundSource::BuiltinNotification);

        for candidate in chain {
            let sound = match source::load(&candidate) {
                Ok(sound) => sound,
                Err(e) => {
                    warn!("cannot load {candidate} for alarm '{id}': {e}");
                    continue;
                }
            };
            match self.sounder.start_looping(&sound, ready_timeout) {
                Ok(handle) => {
                    debug!("alarm '{id}' playing {candidate}");
                    return Some(handle);
                }
                Err(e) => {
                    warn!("cannot play {candidate} for alarm '{id}': {e}");
                }
            }
        }
        None
    }

    /// Stop the active session, if any. Returns `true` when a session
    /// was ringing.
    pub async fn dismiss(&self) -> bool {
        let mut active = self.active.lock().await;
        match active.take() {
            Some(ring) => {
                info!("dismissing alarm '{}'", ring.alarm_id);
                self.teardown(ring);
                true
            }
            None => {
                debug!("dismiss with no active session");
                false
            }
        }
    }

    /// Snooze the active session: derive and schedule a follow-up record,
    /// then stop ringing.
    ///
    /// Teardown proceeds even when scheduling fails; the schedule outcome
    /// is reported to the caller. Returns the derived record on success,
    /// or `None` when no session was active.
    pub async fn snooze(&self) -> crate::Result<Option<AlarmRecord>> {
        let mut active = self.active.lock().await;
        let Some(ring) = active.take() else {
            debug!("snooze with no active session");
            return Ok(None);
        };

        let now = now_epoch_millis();
        let record = AlarmRecord::new(
            format!("{}_snooze_{now}", ring.alarm_id),
            now + (self.session.snooze_duration_secs as i64) * 1_000,
            format!("{} (Snoozed)", ring.label),
        );
        info!(
            "snoozing alarm '{}' for {}s as '{}'",
            ring.alarm_id, self.session.snooze_duration_secs, record.id
        );

        let outcome = self.scheduler.schedule(&record);
        if let Err(e) = &outcome {
            warn!("snooze re-schedule failed for '{}': {e}", record.id);
        }

        self.teardown(ring);
        outcome.map(|_| Some(record))
    }

    /// Release every resource of a session, unconditionally and in order.
    /// Individual failures are logged; the sequence never aborts.
    fn teardown(&self, mut ring: ActiveRing) {
        self.set_snapshot(SessionState::Stopping, Some(ring.alarm_id.clone()));

        if let Some(mut audio) = ring.audio.take() {
            audio.stop();
        }
        if ring.vibrating {
            self.platform.vibrator.cancel();
        }
        if let Some(focus) = ring.focus.take() {
            drop(focus);
        }
        if let Some(wake) = ring.wake.take() {
            wake.release();
        }
        self.platform.notifier.clear();

        self.set_snapshot(SessionState::Idle, None);
        info!("ringing session for alarm '{}' torn down", ring.alarm_id);
    }
}
