use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vocabulary::VocabularyList;

/// Most-recent-first history keeps at most this many posters.
pub const HISTORY_CAP: usize = 10;

/// Default byte budget for the history file, sized like a browser
/// localStorage bucket.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history quota exceeded: {size} of {quota} bytes")]
    QuotaExceeded { size: usize, quota: usize },
    #[error("history io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("history serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub scene: String,
    pub title: String,
    pub vocabulary: VocabularyList,
    pub timestamp: String,
    pub provider_used: String,
}

impl HistoryEntry {
    pub fn new(
        scene: impl Into<String>,
        title: impl Into<String>,
        vocabulary: VocabularyList,
        provider_used: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            scene: scene.into(),
            title: title.into(),
            vocabulary,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            provider_used: provider_used.into(),
        }
    }
}

/// JSON-file-backed generation history with a byte quota.
///
/// Entries are kept most-recent-first and capped at [`HISTORY_CAP`]; a
/// (scene, title) match overwrites the existing entry in place instead of
/// growing the list. A write whose serialized payload exceeds the quota
/// fails with [`HistoryError::QuotaExceeded`] — the recovery policy (clear
/// and retry once) belongs to the caller, not the store.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    quota_bytes: usize,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_quota(path, DEFAULT_QUOTA_BYTES)
    }

    pub fn with_quota(path: impl Into<PathBuf>, quota_bytes: usize) -> Self {
        Self {
            path: path.into(),
            quota_bytes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or corrupt files read as an empty history.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }

    pub fn record(&self, entry: HistoryEntry) -> Result<(), HistoryError> {
        let mut entries = self.entries();
        let existing = entries
            .iter()
            .position(|row| row.scene == entry.scene && row.title == entry.title);
        match existing {
            Some(index) => entries[index] = entry,
            None => {
                entries.insert(0, entry);
                entries.truncate(HISTORY_CAP);
            }
        }
        self.write(&entries)
    }

    pub fn clear(&self) -> Result<(), HistoryError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
        let raw = serde_json::to_string(entries)?;
        if raw.len() > self.quota_bytes {
            return Err(HistoryError::QuotaExceeded {
                size: raw.len(),
                quota: self.quota_bytes,
            });
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(scene: &str, title: &str) -> HistoryEntry {
        HistoryEntry::new(
            scene,
            title,
            VocabularyList {
                core: vec!["teacher 老师".to_string()],
                items: vec!["book 书".to_string()],
                environment: vec!["flag 国旗".to_string()],
            },
            "kie",
        )
    }

    #[test]
    fn record_keeps_most_recent_first() -> Result<(), HistoryError> {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = HistoryStore::new(temp.path().join("history.json"));
        store.record(entry("学校", "first"))?;
        store.record(entry("公园", "second"))?;

        let entries = store.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "second");
        assert_eq!(entries[1].title, "first");
        Ok(())
    }

    #[test]
    fn eleventh_entry_drops_the_oldest() -> Result<(), HistoryError> {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = HistoryStore::new(temp.path().join("history.json"));
        for index in 0..10 {
            store.record(entry("学校", &format!("poster-{index}")))?;
        }
        store.record(entry("学校", "poster-10"))?;

        let entries = store.entries();
        assert_eq!(entries.len(), HISTORY_CAP);
        assert_eq!(entries[0].title, "poster-10");
        assert!(entries.iter().all(|row| row.title != "poster-0"));
        Ok(())
    }

    #[test]
    fn scene_title_match_overwrites_in_place() -> Result<(), HistoryError> {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = HistoryStore::new(temp.path().join("history.json"));
        store.record(entry("学校", "alpha"))?;
        store.record(entry("公园", "beta"))?;

        let mut replacement = entry("学校", "alpha");
        replacement.provider_used = "yunwu".to_string();
        store.record(replacement)?;

        let entries = store.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "beta");
        assert_eq!(entries[1].title, "alpha");
        assert_eq!(entries[1].provider_used, "yunwu");
        Ok(())
    }

    #[test]
    fn oversized_write_reports_quota() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = HistoryStore::with_quota(temp.path().join("history.json"), 64);
        let err = store.record(entry("学校", "quota")).expect_err("quota hit");
        assert!(matches!(err, HistoryError::QuotaExceeded { .. }));
        assert!(store.entries().is_empty());
    }

    #[test]
    fn clear_then_record_recovers() -> Result<(), HistoryError> {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = HistoryStore::new(temp.path().join("history.json"));
        store.record(entry("学校", "keep"))?;
        store.clear()?;
        assert!(store.entries().is_empty());
        store.record(entry("公园", "after"))?;
        assert_eq!(store.entries().len(), 1);
        Ok(())
    }

    #[test]
    fn corrupt_file_reads_as_empty() -> Result<(), HistoryError> {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("history.json");
        fs::write(&path, "{{{{").expect("write");
        let store = HistoryStore::new(path);
        assert!(store.entries().is_empty());
        store.record(entry("学校", "fresh"))?;
        assert_eq!(store.entries().len(), 1);
        Ok(())
    }
}
