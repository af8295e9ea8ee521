//! End-to-end schedule / fire / cancel behavior over the in-process
//! wake facility.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use reveil::registrar::now_epoch_millis;
use reveil::{
    AlarmError, AlarmRecord, AlarmScheduler, InProcessWakeFacility, ScheduleOutcome, ScheduleStore,
    TimerRegistrar, TriggerEvent, WakeFacility, WakePrecision,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Harness {
    scheduler: AlarmScheduler,
    store: Arc<ScheduleStore>,
    facility: Arc<InProcessWakeFacility>,
    events: mpsc::UnboundedReceiver<TriggerEvent>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    harness_with_capability(true)
}

fn harness_with_capability(granted: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let (tx, events) = mpsc::unbounded_channel();
    let facility = Arc::new(InProcessWakeFacility::with_exact_granted(tx, granted));
    let store = Arc::new(ScheduleStore::new(dir.path().join("alarms.json")));
    let scheduler = AlarmScheduler::new(
        Arc::clone(&store),
        TimerRegistrar::new(Arc::clone(&facility) as Arc<dyn WakeFacility>),
    );
    Harness {
        scheduler,
        store,
        facility,
        events,
        _dir: dir,
    }
}

async fn expect_fire(events: &mut mpsc::UnboundedReceiver<TriggerEvent>) -> (String, String) {
    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event within timeout")
        .expect("channel open");
    match event {
        TriggerEvent::Fire { id, label } => (id, label),
        TriggerEvent::Restart => panic!("unexpected restart event"),
    }
}

#[tokio::test]
async fn scheduled_alarm_fires_with_its_payload() {
    let mut h = harness();

    let record = AlarmRecord::new("morning", now_epoch_millis() + 20, "Wake up");
    let outcome = h.scheduler.schedule(&record).unwrap();
    assert_eq!(
        outcome,
        ScheduleOutcome::Armed {
            precision: WakePrecision::ExactAllowWhileIdle
        }
    );

    let (id, label) = expect_fire(&mut h.events).await;
    assert_eq!(id, "morning");
    assert_eq!(label, "Wake up");
}

#[tokio::test]
async fn rescheduling_replaces_instead_of_duplicating() {
    let mut h = harness();

    h.scheduler
        .schedule(&AlarmRecord::new(
            "morning",
            now_epoch_millis() + 3_600_000,
            "First",
        ))
        .unwrap();
    h.scheduler
        .schedule(&AlarmRecord::new(
            "morning",
            now_epoch_millis() + 30,
            "Second",
        ))
        .unwrap();

    assert_eq!(h.scheduler.list_all().len(), 1);
    assert_eq!(h.facility.pending_count(), 1);

    let (_, label) = expect_fire(&mut h.events).await;
    assert_eq!(label, "Second");

    // The replaced registration never fires.
    let extra = tokio::time::timeout(Duration::from_millis(200), h.events.recv()).await;
    assert!(extra.is_err());
}

#[tokio::test]
async fn cancelled_alarm_never_fires_and_cancel_is_idempotent() {
    let mut h = harness();

    h.scheduler
        .schedule(&AlarmRecord::new("morning", now_epoch_millis() + 50, "Wake"))
        .unwrap();
    h.scheduler.cancel("morning").unwrap();
    h.scheduler.cancel("morning").unwrap();
    h.scheduler.cancel("never-scheduled").unwrap();

    assert!(h.scheduler.list_all().is_empty());
    let fired = tokio::time::timeout(Duration::from_millis(300), h.events.recv()).await;
    assert!(fired.is_err(), "cancelled alarm fired");
}

#[tokio::test]
async fn disabled_alarm_is_persisted_but_silent() {
    let mut h = harness();

    let mut record = AlarmRecord::new("quiet", now_epoch_millis() + 30, "Quiet");
    record.enabled = false;
    let outcome = h.scheduler.schedule(&record).unwrap();
    assert_eq!(outcome, ScheduleOutcome::StoredDisabled);

    assert_eq!(h.scheduler.list_all().len(), 1);
    assert_eq!(h.facility.pending_count(), 0);
    let fired = tokio::time::timeout(Duration::from_millis(300), h.events.recv()).await;
    assert!(fired.is_err(), "disabled alarm fired");
}

#[tokio::test]
async fn past_trigger_time_is_rejected_before_persisting() {
    let h = harness();

    let record = AlarmRecord::new("late", now_epoch_millis() - 1, "Late");
    let err = h.scheduler.schedule(&record).unwrap_err();
    assert!(matches!(err, AlarmError::InvalidTime));
    assert!(h.store.list_all().is_empty());
}

#[tokio::test]
async fn denied_capability_blocks_scheduling_without_store_writes() {
    let h = harness_with_capability(false);

    assert!(!h.scheduler.can_schedule_exact());
    let record = AlarmRecord::new("morning", now_epoch_millis() + 60_000, "Wake");
    let err = h.scheduler.schedule(&record).unwrap_err();
    assert!(matches!(err, AlarmError::PermissionDenied));
    assert!(h.store.list_all().is_empty());
    assert_eq!(h.facility.pending_count(), 0);

    // Granting the capability unblocks the same record.
    h.scheduler.request_exact_alarm_capability();
    assert!(h.scheduler.schedule(&record).is_ok());
    assert_eq!(h.store.list_all().len(), 1);
}

#[tokio::test]
async fn store_survives_reopening_from_the_same_path() {
    let h = harness();

    let record = AlarmRecord::new("morning", now_epoch_millis() + 3_600_000, "Wake");
    h.scheduler.schedule(&record).unwrap();

    // A fresh store over the same file sees the persisted record.
    let reopened = ScheduleStore::new(h._dir.path().join("alarms.json"));
    assert_eq!(reopened.list_all(), vec![record]);
}
