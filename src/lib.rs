//! Reveil: alarm scheduling, persistence, and ringing for a resident daemon.
//!
//! The crate is organised around the path an alarm takes through its life:
//!
//! - [`store`] persists the alarm list as a JSON array, the durable source
//!   of truth that survives restarts.
//! - [`registrar`] turns records into exact-wake timer registrations with
//!   the host facility, keyed by a token derived from the alarm id.
//! - [`trigger`] consumes fire and restart events, holding a bounded wake
//!   reservation while a fired alarm is handed to the session, and
//!   rebuilding registrations after a restart.
//! - [`session`] owns the single ringing session: audio with fallback
//!   sources, vibration, the ringing notification, dismiss and snooze.
//! - [`facade`] is the public scheduling surface that sequences store and
//!   registrar so recovery always has a persisted record to work from.
//!
//! [`platform`] abstracts the host facilities (wake reservations, audio
//! focus, vibration, notifications) behind traits, with in-process
//! implementations used by the daemon and tests.

pub mod app_dirs;
pub mod audio;
pub mod config;
pub mod error;
pub mod facade;
pub mod platform;
pub mod registrar;
pub mod session;
pub mod store;
pub mod trigger;

pub use config::AlarmConfig;
pub use error::{AlarmError, Result};
pub use facade::{AlarmScheduler, ScheduleOutcome};
pub use registrar::{InProcessWakeFacility, TimerRegistrar, WakeFacility, WakePrecision};
pub use session::{PlaybackSession, SessionState};
pub use store::{AlarmRecord, ScheduleStore};
pub use trigger::{RingingScreenRequest, TriggerEvent, TriggerListener};
