//! Configuration types for the alarm daemon.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Persisted schedule store settings.
    pub store: StoreConfig,
    /// Trigger-handling settings.
    pub trigger: TriggerConfig,
    /// Ringing session settings.
    pub session: SessionConfig,
    /// Audio output settings.
    pub audio: AudioConfig,
}

/// Schedule store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the persisted alarm list (None = `<data_dir>/alarms.json`).
    pub path: Option<PathBuf>,
}

/// Trigger listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Upper bound on the fire-handling wake reservation, in seconds.
    pub wake_hold_secs: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self { wake_hold_secs: 60 }
    }
}

/// Ringing session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Snooze delay in seconds. Historical builds shipped 5 or 9 minutes;
    /// 9 is the consolidated default.
    pub snooze_duration_secs: u64,
    /// Upper bound on the session wake reservation, in seconds.
    pub wake_hold_secs: u64,
    /// How long to wait for the audio engine's ready signal before
    /// falling back to the next sound source, in milliseconds.
    pub audio_ready_timeout_ms: u64,
    /// Vibration waveform as alternating on/off segment durations (ms),
    /// repeated while ringing.
    pub vibration_pattern_ms: Vec<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            snooze_duration_secs: 9 * 60,
            wake_hold_secs: 10 * 60,
            audio_ready_timeout_ms: 5_000,
            vibration_pattern_ms: vec![1_000, 500],
        }
    }
}

/// Audio output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Alarm sound file (None = built-in alarm tone).
    pub sound_path: Option<PathBuf>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl AlarmConfig {
    /// Load configuration from `<config_dir>/config.toml`.
    ///
    /// A missing file yields defaults; an unreadable or unparsable file is
    /// a [`Config`](crate::AlarmError::Config) error.
    pub fn load() -> crate::Result<Self> {
        Self::load_from(&crate::app_dirs::config_dir().join("config.toml"))
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &std::path::Path) -> crate::Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(crate::AlarmError::Config(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };

        toml::from_str(&contents)
            .map_err(|e| crate::AlarmError::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Resolved path of the persisted alarm store.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| crate::app_dirs::data_dir().join("alarms.json"))
    }
}
