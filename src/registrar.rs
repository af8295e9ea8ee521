//! Exact-wake timer registration.
//!
//! [`TimerRegistrar`] translates one [`AlarmRecord`] into exactly one
//! registration with the host timer facility, and guarantees a later
//! `cancel(id)` targets the same registration: the re-invocation token is
//! a pure function of the alarm id, so nothing needs to be retained
//! between arm and cancel.

use crate::store::AlarmRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// How resistant a registration is to power-saving deferral.
///
/// Selection is a pure function of facility capability, never of record
/// content: the most Doze-resistant primitive available wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakePrecision {
    /// Exact delivery, bypassing idle/doze deferral.
    ExactAllowWhileIdle,
    /// Exact delivery, deferred while the host is idle.
    Exact,
    /// Best-effort delivery.
    Inexact,
}

impl std::fmt::Display for WakePrecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactAllowWhileIdle => write!(f, "exact-allow-while-idle"),
            Self::Exact => write!(f, "exact"),
            Self::Inexact => write!(f, "inexact"),
        }
    }
}

/// What the facility delivers back when a registration fires.
#[derive(Debug, Clone)]
pub struct FirePayload {
    /// Alarm id.
    pub id: String,
    /// Display label.
    pub label: String,
}

/// The host OS exact-wake timer facility.
///
/// Registrations are keyed by token; registering an existing token
/// replaces the prior registration (overwrite-by-token), and cancelling
/// an unknown token is a no-op.
pub trait WakeFacility: Send + Sync {
    /// May this process schedule exact, doze-bypassing wake-ups right now?
    fn can_schedule_exact(&self) -> bool;

    /// Ask the host for the exact-alarm capability. Fire-and-forget; the
    /// outcome is observed through a later [`can_schedule_exact`](Self::can_schedule_exact) poll.
    fn request_exact_capability(&self);

    /// The most doze-resistant precision this host supports.
    fn best_precision(&self) -> WakePrecision;

    /// Register a wake-up at `trigger_at_millis` (epoch ms). A past time
    /// fires immediately.
    fn register(
        &self,
        token: u64,
        precision: WakePrecision,
        trigger_at_millis: i64,
        payload: FirePayload,
    ) -> crate::Result<()>;

    /// Remove the registration for `token`, if any.
    fn cancel(&self, token: u64);
}

/// Derive the re-invocation token for an alarm id.
///
/// Stable across process runs and collision-resistant, which is what lets
/// `cancel` reconstruct the registration slot without bookkeeping.
#[must_use]
pub fn invocation_token(id: &str) -> u64 {
    let hash = blake3::hash(id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Arms and cancels exact-wake registrations for alarm records.
///
/// This layer never touches the schedule store; the facade sequences
/// store and registrar operations.
pub struct TimerRegistrar {
    facility: Arc<dyn WakeFacility>,
}

impl TimerRegistrar {
    /// Create a registrar over the given facility.
    pub fn new(facility: Arc<dyn WakeFacility>) -> Self {
        Self { facility }
    }

    /// Register a wake-up for the record.
    ///
    /// A past trigger time is accepted and fires immediately; rejecting
    /// past times is the facade's job. Returns the precision the
    /// registration was made at.
    ///
    /// # Errors
    ///
    /// [`PermissionDenied`](crate::AlarmError::PermissionDenied) when the
    /// capability gate is closed (nothing is armed), or
    /// [`Registration`](crate::AlarmError::Registration) when the facility
    /// rejects the registration.
    pub fn arm(&self, record: &AlarmRecord) -> crate::Result<WakePrecision> {
        if !self.facility.can_schedule_exact() {
            return Err(crate::AlarmError::PermissionDenied);
        }

        let token = invocation_token(&record.id);
        let precision = self.facility.best_precision();
        self.facility.register(
            token,
            precision,
            record.trigger_time_millis,
            FirePayload {
                id: record.id.clone(),
                label: record.label.clone(),
            },
        )?;

        debug!(
            "armed alarm '{}' at {} ({precision})",
            record.id, record.trigger_time_millis
        );
        Ok(precision)
    }

    /// Cancel the registration for `id`. Cancelling an unarmed or unknown
    /// id is not an error.
    pub fn cancel(&self, id: &str) {
        self.facility.cancel(invocation_token(id));
        debug!("cancelled registration for alarm '{id}'");
    }

    /// Capability gate passthrough.
    #[must_use]
    pub fn can_schedule_exact(&self) -> bool {
        self.facility.can_schedule_exact()
    }

    /// Capability request passthrough.
    pub fn request_exact_capability(&self) {
        self.facility.request_exact_capability();
    }
}

/// Tokio-backed wake facility: the single local timer authority when the
/// daemon is the host.
///
/// One sleep task per registration, keyed by token; registering a token
/// that already has a task replaces it, matching the overwrite semantics
/// of OS-level registration primitives. Each table entry carries a
/// generation number, and a task delivers its fire event only while its
/// generation is still the one in the table; a replaced or cancelled task
/// that already finished sleeping finds a different generation and goes
/// quiet instead of delivering a stale trigger.
///
/// `register` must be called from within a tokio runtime.
pub struct InProcessWakeFacility {
    events: mpsc::UnboundedSender<crate::trigger::TriggerEvent>,
    timers: Arc<Mutex<HashMap<u64, (u64, tokio::task::JoinHandle<()>)>>>,
    generation: AtomicU64,
    exact_granted: AtomicBool,
}

impl InProcessWakeFacility {
    /// Create a facility delivering fire events on `events`, with the
    /// exact-alarm capability already granted.
    pub fn new(events: mpsc::UnboundedSender<crate::trigger::TriggerEvent>) -> Self {
        Self::with_exact_granted(events, true)
    }

    /// Create a facility with an explicit initial capability gate state.
    pub fn with_exact_granted(
        events: mpsc::UnboundedSender<crate::trigger::TriggerEvent>,
        granted: bool,
    ) -> Self {
        Self {
            events,
            timers: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            exact_granted: AtomicBool::new(granted),
        }
    }

    /// Number of currently pending registrations.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.timers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl WakeFacility for InProcessWakeFacility {
    fn can_schedule_exact(&self) -> bool {
        self.exact_granted.load(Ordering::SeqCst)
    }

    fn request_exact_capability(&self) {
        // The in-process authority has nothing to ask the user for; the
        // request grants immediately and is observed via the next poll.
        self.exact_granted.store(true, Ordering::SeqCst);
        info!("exact alarm capability granted");
    }

    fn best_precision(&self) -> WakePrecision {
        // A resident tokio timer never dozes.
        WakePrecision::ExactAllowWhileIdle
    }

    fn register(
        &self,
        token: u64,
        precision: WakePrecision,
        trigger_at_millis: i64,
        payload: FirePayload,
    ) -> crate::Result<()> {
        let delay_millis = trigger_at_millis.saturating_sub(now_epoch_millis()).max(0);
        let delay = std::time::Duration::from_millis(delay_millis as u64);

        let events = self.events.clone();
        let timers = Arc::clone(&self.timers);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let id = payload.id.clone();

        // The entry is installed under the lock before the spawned task
        // can touch the table, so even an immediately-due replacement
        // cannot strip a predecessor's entry without aborting it.
        let mut table = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, previous)) = table.remove(&token) {
            previous.abort();
            debug!("replaced existing registration for alarm '{id}'");
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = {
                let mut table = timers.lock().unwrap_or_else(|e| e.into_inner());
                match table.get(&token) {
                    Some((entry_generation, _)) if *entry_generation == generation => {
                        table.remove(&token);
                        true
                    }
                    _ => false,
                }
            };
            if !current {
                // Superseded or cancelled after the sleep completed.
                return;
            }
            debug!("wake-up fired for alarm '{}'", payload.id);
            let _ = events.send(crate::trigger::TriggerEvent::Fire {
                id: payload.id,
                label: payload.label,
            });
        });
        table.insert(token, (generation, handle));
        drop(table);

        debug!("registered wake-up for alarm '{id}' in {delay:?} ({precision})");
        Ok(())
    }

    fn cancel(&self, token: u64) {
        let removed = self
            .timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&token);
        if let Some((_, handle)) = removed {
            handle.abort();
        }
    }
}
