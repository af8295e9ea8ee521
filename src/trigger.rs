//! Trigger event handling.
//!
//! [`TriggerListener`] consumes the event stream from the wake facility.
//! Fire events are handled under a short-lived wake reservation that is
//! released on every path, including delivery failure; restart events walk
//! the persisted schedule and re-arm what should still fire.

use crate::config::AlarmConfig;
use crate::facade::AlarmScheduler;
use crate::platform::WakeSource;
use crate::registrar::now_epoch_millis;
use crate::session::PlaybackSession;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Event delivered by the wake facility.
#[derive(Debug, Clone)]
pub enum TriggerEvent {
    /// A registered wake-up reached its trigger time.
    Fire {
        /// Alarm id.
        id: String,
        /// Display label.
        label: String,
    },
    /// The process (re)started and persisted registrations may have been
    /// lost by the host.
    Restart,
}

/// Request to bring the full-screen ringing surface to the foreground.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingingScreenRequest {
    /// Alarm id.
    pub id: String,
    /// Display label.
    pub label: String,
}

/// Consumer of [`TriggerEvent`]s.
pub struct TriggerListener {
    scheduler: Arc<AlarmScheduler>,
    session: Arc<PlaybackSession>,
    wake: Arc<dyn WakeSource>,
    screen_tx: mpsc::UnboundedSender<RingingScreenRequest>,
    wake_hold: Duration,
}

impl TriggerListener {
    /// Create a listener.
    pub fn new(
        scheduler: Arc<AlarmScheduler>,
        session: Arc<PlaybackSession>,
        wake: Arc<dyn WakeSource>,
        screen_tx: mpsc::UnboundedSender<RingingScreenRequest>,
        config: &AlarmConfig,
    ) -> Self {
        Self {
            scheduler,
            session,
            wake,
            screen_tx,
            wake_hold: Duration::from_secs(config.trigger.wake_hold_secs),
        }
    }

    /// Consume events until the channel closes.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<TriggerEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                TriggerEvent::Fire { id, label } => self.on_fire(&id, &label).await,
                TriggerEvent::Restart => self.on_restart(),
            }
        }
        debug!("trigger event channel closed");
    }

    /// Handle a fired wake-up.
    ///
    /// A wake reservation is taken before any other work and released on
    /// every path; a delivery failure is logged, never propagated, so the
    /// reservation can never leak.
    pub async fn on_fire(&self, id: &str, label: &str) {
        let guard = self.wake.acquire(&format!("fire:{id}"), self.wake_hold);
        info!("alarm '{id}' fired");

        if let Err(e) = self.deliver(id, label).await {
            error!("trigger delivery failed for alarm '{id}': {e}");
        }

        guard.release();
    }

    async fn deliver(&self, id: &str, label: &str) -> crate::Result<()> {
        self.session.start(id, label).await;
        self.screen_tx
            .send(RingingScreenRequest {
                id: id.to_owned(),
                label: label.to_owned(),
            })
            .map_err(|e| crate::AlarmError::Channel(format!("ringing screen request: {e}")))
    }

    /// Rebuild timer registrations after a restart.
    ///
    /// Enabled records with a future trigger time are re-armed; enabled
    /// records whose time passed while the process was down are purged.
    /// Disabled records are retained untouched whatever their trigger
    /// time, so re-enabling one later still finds it. Per-record failures
    /// are logged and the walk continues, so one bad record never blocks
    /// recovery of the rest.
    pub fn on_restart(&self) {
        let records = self.scheduler.list_all();
        let now = now_epoch_millis();
        info!("restart recovery over {} persisted alarm(s)", records.len());

        let mut armed = 0usize;
        let mut purged = 0usize;
        for record in &records {
            if !record.enabled {
                debug!("leaving disabled alarm '{}' unarmed", record.id);
                continue;
            }

            if record.trigger_time_millis <= now {
                // Missed while down; a stale one-shot must not fire late.
                info!(
                    "purging past-due alarm '{}' (was due at {})",
                    record.id, record.trigger_time_millis
                );
                if let Err(e) = self.scheduler.store().remove(&record.id) {
                    warn!("cannot purge alarm '{}': {e}", record.id);
                } else {
                    purged += 1;
                }
                continue;
            }

            match self.scheduler.registrar().arm(record) {
                Ok(precision) => {
                    debug!("re-armed alarm '{}' ({precision})", record.id);
                    armed += 1;
                }
                Err(e) => warn!("cannot re-arm alarm '{}': {e}", record.id),
            }
        }

        info!("restart recovery done: {armed} re-armed, {purged} purged");
    }
}
