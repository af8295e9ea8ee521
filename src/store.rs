//! Durable schedule store.
//!
//! Persists the full alarm set as one JSON array in a single file, so
//! "list all" and restart recovery are single-read operations. A missing
//! or corrupt file reads as an empty set; losing recovery data is
//! preferable to failing boot-time recovery.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

/// One persisted alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRecord {
    /// Unique alarm identifier. Snooze derivations append
    /// `_snooze_<epoch-millis>` to stay unique.
    pub id: String,
    /// Absolute trigger time, epoch milliseconds.
    #[serde(rename = "triggerTime")]
    pub trigger_time_millis: i64,
    /// Display label.
    #[serde(default = "default_label")]
    pub label: String,
    /// Disabled records are retained but never armed.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_label() -> String {
    "Alarm".to_owned()
}

const fn default_enabled() -> bool {
    true
}

impl AlarmRecord {
    /// Create an enabled record.
    pub fn new(id: impl Into<String>, trigger_time_millis: i64, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            trigger_time_millis,
            label: label.into(),
            enabled: true,
        }
    }
}

/// File-backed alarm store. All mutation is a read-modify-write cycle
/// under an internal mutex; writes are flushed before returning.
pub struct ScheduleStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ScheduleStore {
    /// Create a store backed by the given file. The file is created lazily
    /// on first write.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Insert or replace the record with the same `id`.
    pub fn put(&self, record: &AlarmRecord) -> crate::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut records = self.read_records();
        records.retain(|existing| existing.id != record.id);
        records.push(record.clone());
        self.write_records(&records)
    }

    /// Remove the record with the given `id`. Removing an absent id is
    /// not an error.
    pub fn remove(&self, id: &str) -> crate::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut records = self.read_records();
        let before = records.len();
        records.retain(|existing| existing.id != id);
        if records.len() == before {
            return Ok(());
        }
        self.write_records(&records)
    }

    /// Return every persisted record. Missing or corrupt data reads as
    /// an empty set.
    pub fn list_all(&self) -> Vec<AlarmRecord> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read_records()
    }

    fn read_records(&self) -> Vec<AlarmRecord> {
        let bytes = match std::fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("cannot read alarm store {}: {e}", self.path.display());
                return Vec::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    "alarm store {} is corrupt, treating as empty: {e}",
                    self.path.display()
                );
                Vec::new()
            }
        }
    }

    fn write_records(&self, records: &[AlarmRecord]) -> crate::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::AlarmError::Store(format!("cannot create store dir: {e}")))?;
        }

        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| crate::AlarmError::Store(format!("cannot serialize alarms: {e}")))?;

        // A crash right after put() returns must not lose the record, so
        // the file is synced before this function returns.
        let mut file = std::fs::File::create(&self.path)
            .map_err(|e| crate::AlarmError::Store(format!("cannot create store file: {e}")))?;
        file.write_all(&json)
            .map_err(|e| crate::AlarmError::Store(format!("cannot write store file: {e}")))?;
        file.sync_all()
            .map_err(|e| crate::AlarmError::Store(format!("cannot sync store file: {e}")))?;

        debug!(
            "persisted {} alarm(s) to {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> ScheduleStore {
        ScheduleStore::new(dir.path().join("alarms.json"))
    }

    #[test]
    fn put_then_list_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let record = AlarmRecord::new("a1", 1_700_000_000_000, "Wake");
        store.put(&record).unwrap();

        let all = store.list_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], record);
    }

    #[test]
    fn put_same_id_replaces_not_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.put(&AlarmRecord::new("a1", 1_000, "First")).unwrap();
        store.put(&AlarmRecord::new("a1", 2_000, "Second")).unwrap();

        let all = store.list_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].trigger_time_millis, 2_000);
        assert_eq!(all[0].label, "Second");
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.put(&AlarmRecord::new("a1", 1_000, "Wake")).unwrap();
        store.remove("a1").unwrap();
        store.remove("a1").unwrap();
        store.remove("never-existed").unwrap();

        assert!(store.list_all().is_empty());
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.list_all().is_empty());
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarms.json");
        std::fs::write(&path, "{{{ not json").unwrap();

        let store = ScheduleStore::new(path);
        assert!(store.list_all().is_empty());
    }

    #[test]
    fn put_recovers_a_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarms.json");
        std::fs::write(&path, "garbage").unwrap();

        let store = ScheduleStore::new(path);
        store.put(&AlarmRecord::new("a1", 1_000, "Wake")).unwrap();
        assert_eq!(store.list_all().len(), 1);
    }

    #[test]
    fn on_disk_layout_uses_trigger_time_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarms.json");
        let store = ScheduleStore::new(path.clone());
        store.put(&AlarmRecord::new("a1", 42, "Wake")).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"triggerTime\": 42"));
        assert!(raw.contains("\"id\": \"a1\""));
    }

    #[test]
    fn stored_record_without_label_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarms.json");
        std::fs::write(&path, r#"[{"id":"a1","triggerTime":5}]"#).unwrap();

        let store = ScheduleStore::new(path);
        let all = store.list_all();
        assert_eq!(all[0].label, "Alarm");
        assert!(all[0].enabled);
    }
}
