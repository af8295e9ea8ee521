//! Public scheduling surface.
//!
//! [`AlarmScheduler`] is what the front-end bridge calls. It owns the
//! store-then-arm ordering: the durable write happens before the timer
//! registration, so a crash between the two leaves a record that restart
//! recovery can re-arm, never an armed-but-unpersisted timer.

use crate::registrar::{TimerRegistrar, WakePrecision, now_epoch_millis};
use crate::store::{AlarmRecord, ScheduleStore};
use chrono::TimeZone;
use std::sync::Arc;
use tracing::{debug, info};

/// What `schedule` did with the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Persisted and registered with the timer facility.
    Armed {
        /// Precision the registration was made at.
        precision: WakePrecision,
    },
    /// Persisted but not armed because the record is disabled; any prior
    /// registration for the id was cancelled.
    StoredDisabled,
}

/// The schedule / cancel / list / capability surface.
pub struct AlarmScheduler {
    store: Arc<ScheduleStore>,
    registrar: TimerRegistrar,
}

impl AlarmScheduler {
    /// Create the facade over a store and registrar.
    pub fn new(store: Arc<ScheduleStore>, registrar: TimerRegistrar) -> Self {
        Self { store, registrar }
    }

    /// Persist and arm an alarm.
    ///
    /// # Errors
    ///
    /// - [`InvalidTime`](crate::AlarmError::InvalidTime) when the trigger
    ///   time is not in the future.
    /// - [`PermissionDenied`](crate::AlarmError::PermissionDenied) when the
    ///   exact-alarm gate is closed; the store is left unchanged.
    /// - [`Registration`](crate::AlarmError::Registration) when the
    ///   facility rejects the arm; the record stays persisted so restart
    ///   recovery or a retry can re-arm it.
    pub fn schedule(&self, record: &AlarmRecord) -> crate::Result<ScheduleOutcome> {
        if record.trigger_time_millis <= now_epoch_millis() {
            return Err(crate::AlarmError::InvalidTime);
        }

        if !record.enabled {
            // Disabled records are retained but never armed.
            self.store.put(record)?;
            self.registrar.cancel(&record.id);
            debug!("stored disabled alarm '{}'", record.id);
            return Ok(ScheduleOutcome::StoredDisabled);
        }

        if !self.registrar.can_schedule_exact() {
            return Err(crate::AlarmError::PermissionDenied);
        }

        self.store.put(record)?;
        let precision = self.registrar.arm(record)?;
        info!(
            "scheduled alarm '{}' for {} ({precision})",
            record.id, record.trigger_time_millis
        );
        Ok(ScheduleOutcome::Armed { precision })
    }

    /// Schedule the next wall-clock occurrence of `hour:minute` local
    /// time (today if still ahead, otherwise tomorrow).
    ///
    /// Returns the record that was scheduled alongside the outcome.
    pub fn schedule_at_time(
        &self,
        id: &str,
        hour: u32,
        minute: u32,
        label: &str,
    ) -> crate::Result<(AlarmRecord, ScheduleOutcome)> {
        let time = chrono::NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or(crate::AlarmError::InvalidTime)?;
        let now = chrono::Local::now();

        let mut target_date = now.date_naive();
        let mut target = resolve_local(target_date.and_time(time))?;
        if target <= now {
            target_date = target_date
                .succ_opt()
                .ok_or(crate::AlarmError::InvalidTime)?;
            target = resolve_local(target_date.and_time(time))?;
        }

        let record = AlarmRecord::new(id, target.timestamp_millis(), label);
        let outcome = self.schedule(&record)?;
        Ok((record, outcome))
    }

    /// Cancel the registration and remove the record. Both steps are
    /// idempotent; cancelling an unknown id succeeds.
    pub fn cancel(&self, id: &str) -> crate::Result<()> {
        self.registrar.cancel(id);
        self.store.remove(id)?;
        info!("cancelled alarm '{id}'");
        Ok(())
    }

    /// Every persisted record.
    #[must_use]
    pub fn list_all(&self) -> Vec<AlarmRecord> {
        self.store.list_all()
    }

    /// Whether exact, doze-bypassing alarms may be scheduled right now.
    #[must_use]
    pub fn can_schedule_exact(&self) -> bool {
        self.registrar.can_schedule_exact()
    }

    /// Ask the host for the exact-alarm capability. Fire-and-forget; poll
    /// [`can_schedule_exact`](Self::can_schedule_exact) to observe the result.
    pub fn request_exact_alarm_capability(&self) {
        self.registrar.request_exact_capability();
    }

    pub(crate) fn store(&self) -> &ScheduleStore {
        &self.store
    }

    pub(crate) fn registrar(&self) -> &TimerRegistrar {
        &self.registrar
    }
}

fn resolve_local(
    naive: chrono::NaiveDateTime,
) -> crate::Result<chrono::DateTime<chrono::Local>> {
    // DST gaps make some local times nonexistent; take the earliest valid
    // interpretation.
    chrono::Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or(crate::AlarmError::InvalidTime)
}
