//! Durable record of the last synchronized state per directory pair.
//!
//! The store is read in full when opened and written in full by
//! [`SyncStateStore::save`]. Mutations only touch the in-memory document, so
//! a run that is interrupted before `save` leaves the previous file intact
//! and the affected files are simply re-evaluated next time.
//!
//! On disk the document looks like:
//!
//! ```json
//! {
//!   "sync_pairs": {
//!     "/abs/source|/abs/target": {
//!       "last_sync": "2026-01-01T00:00:00Z",
//!       "files": {
//!         "planner": {
//!           "source_mtime": 1767225600.25,
//!           "target_mtime": 1767225600.25,
//!           "last_action": "source_to_target",
//!           "last_sync_time": "2026-01-01T00:00:00Z"
//!         }
//!       }
//!     }
//!   }
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Last synchronized state of one logical file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileState {
    /// Source mtime (seconds since the Unix epoch) recorded after the last sync.
    pub source_mtime: Option<f64>,
    /// Target mtime recorded after the last sync.
    pub target_mtime: Option<f64>,
    /// Action that produced this record (e.g. `source_to_target`).
    pub last_action: String,
    /// RFC 3339 timestamp of the sync that produced this record.
    pub last_sync_time: String,
}

/// All tracked files for one (source, target) directory pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairState {
    #[serde(default)]
    pub last_sync: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<String, FileState>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default)]
    sync_pairs: BTreeMap<String, PairState>,
}

/// File-backed sync state, keyed by resolved directory pair.
#[derive(Debug)]
pub struct SyncStateStore {
    path: PathBuf,
    document: StateDocument,
}

impl SyncStateStore {
    /// Opens the store backed by `path`.
    ///
    /// A missing file yields an empty store. An unreadable or corrupt file
    /// also yields an empty store, with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let document = load_document(&path);
        Self { path, document }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stable, order-sensitive key for a directory pair.
    ///
    /// Both paths are resolved (absolute, symlinks followed when the path
    /// exists) so the key does not depend on the working directory.
    pub fn pair_key(source_dir: &Path, target_dir: &Path) -> String {
        format!(
            "{}|{}",
            resolve_path(source_dir).display(),
            resolve_path(target_dir).display()
        )
    }

    /// State of a directory pair, if any file of it was ever synced.
    pub fn pair_state(&self, source_dir: &Path, target_dir: &Path) -> Option<&PairState> {
        self.document
            .sync_pairs
            .get(&Self::pair_key(source_dir, target_dir))
    }

    pub fn get_file_state(
        &self,
        source_dir: &Path,
        target_dir: &Path,
        base_name: &str,
    ) -> Option<&FileState> {
        self.pair_state(source_dir, target_dir)
            .and_then(|pair| pair.files.get(base_name))
    }

    /// Base names tracked for a directory pair, in sorted order.
    pub fn tracked_files(&self, source_dir: &Path, target_dir: &Path) -> Vec<String> {
        self.pair_state(source_dir, target_dir)
            .map(|pair| pair.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Upserts one file's record and bumps the pair's `last_sync`.
    ///
    /// Nothing is written to disk until [`save`](Self::save) is called.
    pub fn update_file_state(
        &mut self,
        source_dir: &Path,
        target_dir: &Path,
        base_name: &str,
        source_mtime: Option<f64>,
        target_mtime: Option<f64>,
        action: &str,
    ) {
        let now = now_timestamp();
        let pair = self
            .document
            .sync_pairs
            .entry(Self::pair_key(source_dir, target_dir))
            .or_default();
        pair.files.insert(
            base_name.to_string(),
            FileState {
                source_mtime,
                target_mtime,
                last_action: action.to_string(),
                last_sync_time: now.clone(),
            },
        );
        pair.last_sync = Some(now);
    }

    /// Removes one file's record. Returns whether a record existed.
    pub fn remove_file_state(
        &mut self,
        source_dir: &Path,
        target_dir: &Path,
        base_name: &str,
    ) -> bool {
        let key = Self::pair_key(source_dir, target_dir);
        self.document
            .sync_pairs
            .get_mut(&key)
            .is_some_and(|pair| pair.files.remove(base_name).is_some())
    }

    /// Drops everything recorded for a directory pair.
    pub fn clear_pair_state(&mut self, source_dir: &Path, target_dir: &Path) -> bool {
        self.document
            .sync_pairs
            .remove(&Self::pair_key(source_dir, target_dir))
            .is_some()
    }

    /// Writes the whole document to the backing file.
    ///
    /// The document is written to a sibling temp file first and then renamed
    /// over the target, so readers never observe a half-written state file.
    pub fn save(&self) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .with_context(|| format!("Failed to create state directory {}", parent.display()))?;

        let json = serde_json::to_string_pretty(&self.document)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)
            .with_context(|| format!("Failed to stage state file in {}", parent.display()))?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to write state file {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), "Saved sync state");
        Ok(())
    }
}

fn load_document(path: &Path) -> StateDocument {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return StateDocument::default(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Cannot read sync state; starting empty");
            return StateDocument::default();
        }
    };
    match serde_json::from_str(&text) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Sync state is corrupt; starting empty");
            StateDocument::default()
        }
    }
}

fn resolve_path(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn now_timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn dirs(root: &Path) -> (PathBuf, PathBuf) {
        let source = root.join("source");
        let target = root.join("target");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&target).unwrap();
        (source, target)
    }

    #[test]
    fn missing_file_yields_empty_store() {
        let tmp = tempdir().unwrap();
        let (source, target) = dirs(tmp.path());
        let store = SyncStateStore::open(tmp.path().join("absent.json"));

        assert!(store.pair_state(&source, &target).is_none());
        assert!(store.get_file_state(&source, &target, "planner").is_none());
    }

    #[test]
    fn corrupt_file_yields_empty_store() {
        let tmp = tempdir().unwrap();
        let (source, target) = dirs(tmp.path());
        let path = tmp.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SyncStateStore::open(&path);
        assert!(store.tracked_files(&source, &target).is_empty());
    }

    #[test]
    fn pair_key_resolves_equivalent_paths() {
        let tmp = tempdir().unwrap();
        let (source, target) = dirs(tmp.path());
        let dotted = source.join("..").join("source");

        assert_eq!(
            SyncStateStore::pair_key(&source, &target),
            SyncStateStore::pair_key(&dotted, &target)
        );
    }

    #[test]
    fn pair_key_is_order_sensitive() {
        let tmp = tempdir().unwrap();
        let (source, target) = dirs(tmp.path());

        assert_ne!(
            SyncStateStore::pair_key(&source, &target),
            SyncStateStore::pair_key(&target, &source)
        );
    }

    #[test]
    fn update_records_file_and_bumps_last_sync() {
        let tmp = tempdir().unwrap();
        let (source, target) = dirs(tmp.path());
        let mut store = SyncStateStore::open(tmp.path().join("state.json"));

        store.update_file_state(
            &source,
            &target,
            "planner",
            Some(10.5),
            Some(11.0),
            "source_to_target",
        );

        let state = store.get_file_state(&source, &target, "planner").unwrap();
        assert_eq!(state.source_mtime, Some(10.5));
        assert_eq!(state.target_mtime, Some(11.0));
        assert_eq!(state.last_action, "source_to_target");
        assert!(store.pair_state(&source, &target).unwrap().last_sync.is_some());
    }

    #[test]
    fn updates_are_not_persisted_without_save() {
        let tmp = tempdir().unwrap();
        let (source, target) = dirs(tmp.path());
        let path = tmp.path().join("state.json");

        let mut store = SyncStateStore::open(&path);
        store.update_file_state(&source, &target, "planner", Some(1.0), Some(1.0), "skip");
        drop(store);

        assert!(!path.exists());
        let reopened = SyncStateStore::open(&path);
        assert!(reopened.get_file_state(&source, &target, "planner").is_none());
    }

    #[test]
    fn save_then_reopen_round_trips() {
        let tmp = tempdir().unwrap();
        let (source, target) = dirs(tmp.path());
        let path = tmp.path().join("nested/state.json");

        let mut store = SyncStateStore::open(&path);
        store.update_file_state(
            &source,
            &target,
            "planner",
            Some(1_767_225_600.123_456),
            Some(1_767_225_601.5),
            "target_to_source",
        );
        store.save().unwrap();

        let reopened = SyncStateStore::open(&path);
        let state = reopened.get_file_state(&source, &target, "planner").unwrap();
        assert_eq!(state.source_mtime, Some(1_767_225_600.123_456));
        assert_eq!(state.last_action, "target_to_source");

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let key = SyncStateStore::pair_key(&source, &target);
        assert!(raw["sync_pairs"][key.as_str()]["files"]["planner"].is_object());
    }

    #[test]
    fn remove_and_clear() {
        let tmp = tempdir().unwrap();
        let (source, target) = dirs(tmp.path());
        let mut store = SyncStateStore::open(tmp.path().join("state.json"));
        store.update_file_state(&source, &target, "a", Some(1.0), Some(1.0), "skip");
        store.update_file_state(&source, &target, "b", Some(1.0), Some(1.0), "skip");

        assert!(store.remove_file_state(&source, &target, "a"));
        assert!(!store.remove_file_state(&source, &target, "a"));
        assert_eq!(store.tracked_files(&source, &target), vec!["b".to_string()]);

        assert!(store.clear_pair_state(&source, &target));
        assert!(store.pair_state(&source, &target).is_none());
        assert!(!store.clear_pair_state(&source, &target));
    }
}
