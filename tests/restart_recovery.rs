//! Restart recovery: rebuilding timer registrations from the persisted
//! schedule after the process comes back up.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use reveil::audio::{AlarmSounder, DecodedSound, RingingHandle};
use reveil::platform::{Platform, stub};
use reveil::registrar::now_epoch_millis;
use reveil::{
    AlarmConfig, AlarmRecord, AlarmScheduler, InProcessWakeFacility, PlaybackSession,
    ScheduleStore, TimerRegistrar, TriggerEvent, TriggerListener, WakeFacility,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct SilentHandle;

impl RingingHandle for SilentHandle {
    fn stop(&mut self) {}
}

struct SilentSounder;

impl AlarmSounder for SilentSounder {
    fn start_looping(
        &self,
        _sound: &DecodedSound,
        _ready_timeout: Duration,
    ) -> reveil::Result<Box<dyn RingingHandle>> {
        Ok(Box::new(SilentHandle))
    }
}

struct Daemon {
    listener: TriggerListener,
    scheduler: Arc<AlarmScheduler>,
    facility: Arc<InProcessWakeFacility>,
    events: mpsc::UnboundedReceiver<TriggerEvent>,
    screen_rx: mpsc::UnboundedReceiver<reveil::RingingScreenRequest>,
}

/// Wire a fresh daemon over an existing store file, as a restart would.
fn boot(store_path: std::path::PathBuf) -> Daemon {
    let config = AlarmConfig::default();
    let (event_tx, events) = mpsc::unbounded_channel();
    let facility = Arc::new(InProcessWakeFacility::new(event_tx));
    let store = Arc::new(ScheduleStore::new(store_path));
    let scheduler = Arc::new(AlarmScheduler::new(
        store,
        TimerRegistrar::new(Arc::clone(&facility) as Arc<dyn WakeFacility>),
    ));

    let wake = Arc::new(stub::InProcessWakeSource::new());
    let platform = Platform {
        wake: Arc::clone(&wake) as Arc<dyn reveil::platform::WakeSource>,
        focus: Arc::new(stub::AlwaysGrantedFocus),
        vibrator: Arc::new(stub::NoVibrator),
        notifier: Arc::new(stub::LogNotifier::new()),
    };
    let session = Arc::new(PlaybackSession::new(
        platform,
        Arc::new(SilentSounder),
        Arc::clone(&scheduler),
        &config,
    ));

    let (screen_tx, screen_rx) = mpsc::unbounded_channel();
    let listener = TriggerListener::new(
        Arc::clone(&scheduler),
        Arc::clone(&session),
        Arc::clone(&wake) as Arc<dyn reveil::platform::WakeSource>,
        screen_tx,
        &config,
    );

    Daemon {
        listener,
        scheduler,
        facility,
        events,
        screen_rx,
    }
}

/// Seed the store file directly, standing in for a previous run.
fn seed(path: &std::path::Path, records: &[AlarmRecord]) {
    let store = ScheduleStore::new(path.to_path_buf());
    for record in records {
        store.put(record).unwrap();
    }
}

#[tokio::test]
async fn recovery_rearms_enabled_future_alarms() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alarms.json");
    let now = now_epoch_millis();

    let mut disabled = AlarmRecord::new("disabled", now + 3_600_000, "Disabled");
    disabled.enabled = false;
    seed(
        &path,
        &[
            AlarmRecord::new("early", now + 3_600_000, "Early"),
            AlarmRecord::new("late", now + 7_200_000, "Late"),
            disabled,
        ],
    );

    let daemon = boot(path);
    daemon.listener.on_restart();

    assert_eq!(daemon.facility.pending_count(), 2);
    assert_eq!(daemon.scheduler.list_all().len(), 3);
}

#[tokio::test]
async fn recovery_purges_past_due_alarms() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alarms.json");
    let now = now_epoch_millis();

    seed(
        &path,
        &[
            AlarmRecord::new("missed", now - 120_000, "Missed"),
            AlarmRecord::new("upcoming", now + 3_600_000, "Upcoming"),
        ],
    );

    let daemon = boot(path.clone());
    daemon.listener.on_restart();

    let remaining = daemon.scheduler.list_all();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "upcoming");

    // The purge is durable.
    let reopened = ScheduleStore::new(path);
    assert_eq!(reopened.list_all().len(), 1);
}

#[tokio::test]
async fn recovery_retains_disabled_alarms_even_past_due() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alarms.json");
    let now = now_epoch_millis();

    let mut disabled = AlarmRecord::new("off", now - 3_600_000, "Off");
    disabled.enabled = false;
    seed(
        &path,
        &[
            disabled.clone(),
            AlarmRecord::new("missed", now - 3_600_000, "Missed"),
        ],
    );

    let daemon = boot(path);
    daemon.listener.on_restart();

    // Only the enabled past-due record is purged.
    let remaining = daemon.scheduler.list_all();
    assert_eq!(remaining, vec![disabled]);
    assert_eq!(daemon.facility.pending_count(), 0);
}

#[tokio::test]
async fn recovered_alarm_fires_and_reaches_the_ringing_screen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alarms.json");

    seed(
        &path,
        &[AlarmRecord::new(
            "soon",
            now_epoch_millis() + 50,
            "Back from the dead",
        )],
    );

    let mut daemon = boot(path);
    daemon.listener.on_restart();

    let event = tokio::time::timeout(Duration::from_secs(5), daemon.events.recv())
        .await
        .expect("recovered alarm fires")
        .expect("channel open");
    let TriggerEvent::Fire { id, label } = event else {
        panic!("expected fire event");
    };
    daemon.listener.on_fire(&id, &label).await;

    let request = daemon.screen_rx.recv().await.unwrap();
    assert_eq!(request.id, "soon");
    assert_eq!(request.label, "Back from the dead");
}

#[tokio::test]
async fn recovery_over_corrupt_store_arms_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alarms.json");
    std::fs::write(&path, "]]] not a json array").unwrap();

    let daemon = boot(path);
    daemon.listener.on_restart();

    assert_eq!(daemon.facility.pending_count(), 0);
    assert!(daemon.scheduler.list_all().is_empty());
}

#[tokio::test]
async fn recovery_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alarms.json");

    seed(
        &path,
        &[AlarmRecord::new(
            "stable",
            now_epoch_millis() + 3_600_000,
            "Stable",
        )],
    );

    let daemon = boot(path);
    daemon.listener.on_restart();
    daemon.listener.on_restart();

    // Overwrite-by-token keeps a single registration.
    assert_eq!(daemon.facility.pending_count(), 1);
    assert_eq!(daemon.scheduler.list_all().len(), 1);
}
