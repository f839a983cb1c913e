//! Durable, atomically replaced record of the conversation state.
//!
//! Writes go to a sibling temp file which is fsynced and then renamed over
//! the target, so a reader sees either the previous record or the new one,
//! never a torn file.  All methods are blocking; async callers wrap them in
//! `tokio::task::spawn_blocking`.

use std::fs::{self, File};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::ConversationState;

const RECORD_ID: &str = "conversation";

// ---------------------------------------------------------------------------
// SnapshotError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialise snapshot: {0}")]
    Serialize(String),

    #[error("failed to parse snapshot: {0}")]
    Deserialize(String),
}

// ---------------------------------------------------------------------------
// SnapshotRecord
// ---------------------------------------------------------------------------

/// On-disk layout: `{"id": "conversation", "written_at": …, "state": {…}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: String,
    pub written_at: DateTime<Utc>,
    pub state: ConversationState,
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Handle to the snapshot file.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the record with `state`.
    pub fn write(&self, state: &ConversationState) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let record = SnapshotRecord {
            id: RECORD_ID.to_string(),
            written_at: Utc::now(),
            state: state.clone(),
        };
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| SnapshotError::Serialize(e.to_string()))?;

        let tmp_path = self.temp_path();
        let written = write_synced(&tmp_path, json.as_bytes())
            .and_then(|()| fs::rename(&tmp_path, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Last fully written state, `None` when no record exists.
    pub fn try_read(&self) -> Result<Option<ConversationState>, SnapshotError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let record: SnapshotRecord = serde_json::from_str(&content)
            .map_err(|e| SnapshotError::Deserialize(e.to_string()))?;
        Ok(Some(record.state))
    }

    /// Last fully written state, or the default state when the record is
    /// missing, unreadable or corrupt.  Never fails.
    pub fn read(&self) -> ConversationState {
        match self.try_read() {
            Ok(Some(state)) => state,
            Ok(None) => ConversationState::default(),
            Err(e) => {
                log::warn!("snapshot: read of {:?} failed ({e}), using empty state", self.path);
                ConversationState::default()
            }
        }
    }

    /// Modification time of the record, `None` when it does not exist.
    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    /// Delete the record.  Missing files are not an error.
    pub fn clear(&self) -> Result<(), SnapshotError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// State to start a session from.  With `restore` this is the last
    /// record; otherwise the record is deleted so no reader sees the
    /// previous session.
    pub fn load_or_reset(&self, restore: bool) -> Result<ConversationState, SnapshotError> {
        if restore {
            return Ok(self.read());
        }
        self.clear()?;
        Ok(ConversationState::default())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| RECORD_ID.into());
        name.push(format!(".{}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> SnapshotStore {
        SnapshotStore::new(dir.path().join("conversation-state.json"))
    }

    fn sample_state() -> ConversationState {
        let mut state = ConversationState::default();
        state.push_pair("こんにちは".into(), "こんにちは！".into());
        state.touch();
        state
    }

    #[test]
    fn missing_file_reads_default() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.read(), ConversationState::default());
        assert!(store.try_read().unwrap().is_none());
        assert!(store.modified().is_none());
    }

    #[test]
    fn write_then_read_returns_state() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let state = sample_state();
        store.write(&state).unwrap();
        assert_eq!(store.read(), state);
        assert!(store.modified().is_some());
    }

    #[test]
    fn read_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.write(&sample_state()).unwrap();
        let first = store.read();
        let second = store.read();
        assert_eq!(first, second);
    }

    #[test]
    fn corrupt_file_reads_default() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "{ \"id\": \"conversation\", \"state\": [").unwrap();
        assert_eq!(store.read(), ConversationState::default());
        assert!(matches!(store.try_read(), Err(SnapshotError::Deserialize(_))));
    }

    #[test]
    fn record_layout_has_id_and_timestamp() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.write(&sample_state()).unwrap();
        let raw = fs::read_to_string(store.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["id"], "conversation");
        assert!(json["written_at"].is_string());
        assert_eq!(json["state"]["transcripts"][0], "こんにちは");
    }

    #[test]
    fn write_leaves_no_temp_file_behind() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.write(&sample_state()).unwrap();
        store.write(&sample_state()).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn failed_write_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        // A directory in place of the record makes the rename fail.
        fs::create_dir(store.path()).unwrap();
        assert!(matches!(store.write(&sample_state()), Err(SnapshotError::Io(_))));

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("conversation-state.json")]);
    }

    #[test]
    fn write_under_a_file_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let store = SnapshotStore::new(blocker.join("state.json"));
        assert!(store.write(&sample_state()).is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn load_or_reset_restores_or_discards_previous_session() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.write(&sample_state()).unwrap();

        let restored = store.load_or_reset(true).unwrap();
        assert_eq!(restored.pair_count(), 1);
        assert!(store.try_read().unwrap().is_some());

        let fresh = store.load_or_reset(false).unwrap();
        assert_eq!(fresh, ConversationState::default());
        assert!(store.try_read().unwrap().is_none());
    }

    #[test]
    fn write_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested/deeper/state.json"));
        store.write(&sample_state()).unwrap();
        assert_eq!(store.read().pair_count(), 1);
    }

    #[test]
    fn clear_removes_record_and_tolerates_missing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.write(&sample_state()).unwrap();
        store.clear().unwrap();
        assert!(store.try_read().unwrap().is_none());
        store.clear().unwrap();
    }
}
