//! Alarm daemon.
//!
//! Runs the schedule store, timer registrar, trigger listener, and
//! playback session as one resident process. Commands arrive as JSON
//! lines on stdin; responses and ringing-screen events leave as JSON
//! lines on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use reveil::registrar::now_epoch_millis;
use reveil::{
    AlarmConfig, AlarmRecord, AlarmScheduler, InProcessWakeFacility, PlaybackSession,
    ScheduleOutcome, ScheduleStore, TimerRegistrar, TriggerEvent, TriggerListener, WakeFacility,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "kebab-case")]
enum Command {
    /// Schedule an alarm at an absolute epoch-ms trigger time.
    Schedule {
        id: String,
        #[serde(rename = "triggerTime")]
        trigger_time: i64,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        enabled: Option<bool>,
    },
    /// Schedule the next local-time occurrence of `hour:minute`.
    ScheduleAt {
        id: String,
        hour: u32,
        minute: u32,
        #[serde(default)]
        label: Option<String>,
    },
    Cancel {
        id: String,
    },
    List,
    ListDevices,
    Dismiss,
    Snooze,
    CanExact,
    RequestExact,
    Status,
}

struct Reply;

impl Reply {
    fn ok() -> serde_json::Value {
        serde_json::json!({ "ok": true })
    }

    fn with(detail: serde_json::Value) -> serde_json::Value {
        serde_json::json!({ "ok": true, "detail": detail })
    }

    fn err(e: impl std::fmt::Display) -> serde_json::Value {
        serde_json::json!({ "ok": false, "error": e.to_string() })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AlarmConfig::load().context("loading configuration")?;
    info!("reveild starting; store at {}", config.store_path().display());

    let (event_tx, event_rx) = mpsc::unbounded_channel::<TriggerEvent>();
    let facility = Arc::new(InProcessWakeFacility::new(event_tx.clone()));
    let store = Arc::new(ScheduleStore::new(config.store_path()));
    let scheduler = Arc::new(AlarmScheduler::new(
        Arc::clone(&store),
        TimerRegistrar::new(Arc::clone(&facility) as Arc<dyn WakeFacility>),
    ));

    let platform = reveil::platform::host_platform();
    let sounder = Arc::new(reveil::audio::CpalSounder::new(
        config.audio.output_device.clone(),
    ));
    let session = Arc::new(PlaybackSession::new(
        platform.clone(),
        sounder,
        Arc::clone(&scheduler),
        &config,
    ));

    let (screen_tx, mut screen_rx) = mpsc::unbounded_channel();
    let listener = TriggerListener::new(
        Arc::clone(&scheduler),
        Arc::clone(&session),
        Arc::clone(&platform.wake),
        screen_tx,
        &config,
    );

    // Registrations do not survive the process; rebuild them before
    // accepting commands.
    event_tx
        .send(TriggerEvent::Restart)
        .context("queueing restart recovery")?;

    tokio::spawn(async move {
        listener.run(event_rx).await;
    });

    // Ringing-screen requests go to whoever is watching stdout.
    tokio::spawn(async move {
        while let Some(request) = screen_rx.recv().await {
            let event = serde_json::json!({ "event": "ringing", "request": request });
            println!("{event}");
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Command>(line) {
            Ok(command) => handle(command, &scheduler, &session).await,
            Err(e) => {
                warn!("unparsable command: {e}");
                Reply::err(format!("bad command: {e}"))
            }
        };

        match serde_json::to_string(&reply) {
            Ok(out) => println!("{out}"),
            Err(e) => error!("cannot encode reply: {e}"),
        }
    }

    info!("stdin closed, shutting down");
    session.dismiss().await;
    Ok(())
}

async fn handle(
    command: Command,
    scheduler: &Arc<AlarmScheduler>,
    session: &Arc<PlaybackSession>,
) -> serde_json::Value {
    match command {
        Command::Schedule {
            id,
            trigger_time,
            label,
            enabled,
        } => {
            let mut record =
                AlarmRecord::new(id, trigger_time, label.as_deref().unwrap_or("Alarm"));
            if let Some(enabled) = enabled {
                record.enabled = enabled;
            }
            match scheduler.schedule(&record) {
                Ok(outcome) => Reply::with(outcome_json(&outcome)),
                Err(e) => Reply::err(e),
            }
        }
        Command::ScheduleAt {
            id,
            hour,
            minute,
            label,
        } => {
            match scheduler.schedule_at_time(&id, hour, minute, label.as_deref().unwrap_or("Alarm"))
            {
                Ok((record, outcome)) => Reply::with(serde_json::json!({
                    "triggerTime": record.trigger_time_millis,
                    "outcome": outcome_json(&outcome),
                })),
                Err(e) => Reply::err(e),
            }
        }
        Command::Cancel { id } => match scheduler.cancel(&id) {
            Ok(()) => Reply::ok(),
            Err(e) => Reply::err(e),
        },
        Command::List => match serde_json::to_value(scheduler.list_all()) {
            Ok(alarms) => Reply::with(serde_json::json!({ "alarms": alarms })),
            Err(e) => Reply::err(e),
        },
        Command::ListDevices => match reveil::audio::CpalSounder::list_output_devices() {
            Ok(devices) => Reply::with(serde_json::json!({ "devices": devices })),
            Err(e) => Reply::err(e),
        },
        Command::Dismiss => {
            let was_ringing = session.dismiss().await;
            Reply::with(serde_json::json!({ "wasRinging": was_ringing }))
        }
        Command::Snooze => match session.snooze().await {
            Ok(Some(record)) => Reply::with(serde_json::json!({
                "snoozeId": record.id,
                "triggerTime": record.trigger_time_millis,
            })),
            Ok(None) => Reply::with(serde_json::json!({ "wasRinging": false })),
            Err(e) => Reply::err(e),
        },
        Command::CanExact => Reply::with(serde_json::json!({
            "canScheduleExact": scheduler.can_schedule_exact(),
        })),
        Command::RequestExact => {
            scheduler.request_exact_alarm_capability();
            Reply::ok()
        }
        Command::Status => {
            let (state, alarm_id) = session.current();
            Reply::with(serde_json::json!({
                "state": state.to_string(),
                "alarmId": alarm_id,
                "now": now_epoch_millis(),
            }))
        }
    }
}

fn outcome_json(outcome: &ScheduleOutcome) -> serde_json::Value {
    match outcome {
        ScheduleOutcome::Armed { precision } => serde_json::json!({
            "armed": true,
            "precision": precision,
        }),
        ScheduleOutcome::StoredDisabled => serde_json::json!({ "armed": false }),
    }
}
