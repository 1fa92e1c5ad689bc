//! Resume positions
//!
//! Last known playhead per video. The store is plain key-value; write
//! throttling belongs to the session.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// Stored position for one video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeEntry {
    pub video_id: String,
    pub position_seconds: f64,
    pub saved_at: DateTime<Utc>,
}

/// Key-value persistence for resume positions
pub trait ResumeStore: Send + Sync {
    fn get(&self, video_id: &str) -> Option<ResumeEntry>;

    fn set(&self, video_id: &str, position_seconds: f64) -> Result<()>;

    fn clear(&self, video_id: &str) -> Result<()>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryResumeStore {
    entries: RwLock<HashMap<String, ResumeEntry>>,
}

impl MemoryResumeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResumeStore for MemoryResumeStore {
    fn get(&self, video_id: &str) -> Option<ResumeEntry> {
        read(&self.entries).get(video_id).cloned()
    }

    fn set(&self, video_id: &str, position_seconds: f64) -> Result<()> {
        let entry = new_entry(video_id, position_seconds)?;
        write(&self.entries).insert(video_id.to_string(), entry);
        Ok(())
    }

    fn clear(&self, video_id: &str) -> Result<()> {
        write(&self.entries).remove(video_id);
        Ok(())
    }
}

/// Store persisted as a JSON map, rewritten on every change
#[derive(Debug)]
pub struct JsonFileResumeStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, ResumeEntry>>,
}

impl JsonFileResumeStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), entries = entries.len(), "Resume store opened");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, ResumeEntry>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Failed to persist resume store");
            Error::Io(e)
        })
    }
}

impl ResumeStore for JsonFileResumeStore {
    fn get(&self, video_id: &str) -> Option<ResumeEntry> {
        read(&self.entries).get(video_id).cloned()
    }

    fn set(&self, video_id: &str, position_seconds: f64) -> Result<()> {
        let entry = new_entry(video_id, position_seconds)?;
        let mut entries = write(&self.entries);
        entries.insert(video_id.to_string(), entry);
        self.persist(&entries)
    }

    fn clear(&self, video_id: &str) -> Result<()> {
        let mut entries = write(&self.entries);
        if entries.remove(video_id).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

fn new_entry(video_id: &str, position_seconds: f64) -> Result<ResumeEntry> {
    if !position_seconds.is_finite() || position_seconds < 0.0 {
        return Err(Error::ResumeStore(format!(
            "invalid position {} for {}",
            position_seconds, video_id
        )));
    }
    Ok(ResumeEntry {
        video_id: video_id.to_string(),
        position_seconds,
        saved_at: Utc::now(),
    })
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryResumeStore::new();
        assert!(store.get("v1").is_none());

        store.set("v1", 45.0).unwrap();
        assert_eq!(store.get("v1").unwrap().position_seconds, 45.0);

        store.set("v1", 50.5).unwrap();
        assert_eq!(store.get("v1").unwrap().position_seconds, 50.5);
        assert_eq!(store.len(), 1);

        store.clear("v1").unwrap();
        assert!(store.get("v1").is_none());
    }

    #[test]
    fn test_rejects_non_finite_positions() {
        let store = MemoryResumeStore::new();
        assert!(store.set("v1", f64::NAN).is_err());
        assert!(store.set("v1", -1.0).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.json");

        let store = JsonFileResumeStore::open(&path).unwrap();
        store.set("v1", 12.0).unwrap();
        store.set("v2", 99.0).unwrap();
        store.clear("v2").unwrap();
        drop(store);

        let reopened = JsonFileResumeStore::open(&path).unwrap();
        assert_eq!(reopened.get("v1").unwrap().position_seconds, 12.0);
        assert!(reopened.get("v2").is_none());
    }
}
