//! Durable per-input-file progress for crash-safe resume.
//!
//! A single JSON document maps input path to state. It is rewritten
//! atomically (write temp, rename) after every state change, so the file is
//! never partially written even if the process is killed mid-persist.
//!
//! The store is deliberately forgiving: a missing or malformed document
//! means starting empty with a warning, and a failed persist is retried on
//! the next state transition. Progress loss is always recoverable — an
//! `in-progress` file is simply redone from scratch on the next run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::Result;

/// Processing state of one input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileState {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "done")]
    Done,
}

/// Durable `path -> state` map, serialized through a single mutator.
pub struct ProgressStore {
    path: PathBuf,
    state: Mutex<HashMap<String, FileState>>,
}

impl ProgressStore {
    /// Load the progress document, tolerating absence and corruption.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(text) => match serde_json::from_str::<HashMap<String, FileState>>(&text) {
                Ok(map) => {
                    tracing::info!(
                        path = %path.display(),
                        entries = map.len(),
                        "loaded progress document"
                    );
                    map
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "malformed progress document, starting empty"
                    );
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "unreadable progress document, starting empty"
                );
                HashMap::new()
            }
        };

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// Whether this source has already reached `done`.
    pub async fn has_done(&self, source: &Path) -> bool {
        self.state.lock().await.get(&key(source)) == Some(&FileState::Done)
    }

    /// Register newly enumerated sources as `pending` (existing entries,
    /// including `done` ones, are left untouched). Persists once.
    pub async fn mark_pending_all(&self, sources: &[PathBuf]) {
        let mut map = self.state.lock().await;
        for source in sources {
            map.entry(key(source)).or_insert(FileState::Pending);
        }
        self.persist_locked(&map).await;
    }

    /// Flip a source to `in-progress` and persist.
    pub async fn mark_in_progress(&self, source: &Path) {
        self.set(source, FileState::InProgress).await;
    }

    /// Flip a source to `done` and persist.
    ///
    /// Only called after the source's records have all been flushed.
    pub async fn mark_done(&self, source: &Path) {
        self.set(source, FileState::Done).await;
    }

    /// Copy of the current map, for the shutdown summary.
    pub async fn snapshot(&self) -> HashMap<String, FileState> {
        self.state.lock().await.clone()
    }

    /// Persist the current map (used as the final flush at shutdown).
    pub async fn persist(&self) -> Result<()> {
        let map = self.state.lock().await;
        Self::write_atomic(&self.path, &map).await
    }

    async fn set(&self, source: &Path, new_state: FileState) {
        let mut map = self.state.lock().await;
        map.insert(key(source), new_state);
        self.persist_locked(&map).await;
    }

    /// Persist while already holding the mutator lock; failures are logged
    /// and retried on the next transition.
    async fn persist_locked(&self, map: &HashMap<String, FileState>) {
        if let Err(e) = Self::write_atomic(&self.path, map).await {
            warn!(
                path = %self.path.display(),
                error = %e,
                "failed to persist progress, will retry on next transition"
            );
        }
    }

    async fn write_atomic(path: &Path, map: &HashMap<String, FileState>) -> Result<()> {
        let json = serde_json::to_string_pretty(map)?;

        // Atomic write: temp file first, then rename over the target.
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, path).await?;
        Ok(())
    }
}

fn key(source: &Path) -> String {
    source.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc_path(tmp: &TempDir) -> PathBuf {
        tmp.path().join("ingest-progress.json")
    }

    #[tokio::test]
    async fn test_load_missing_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let store = ProgressStore::load(doc_path(&tmp)).await;
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_malformed_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let path = doc_path(&tmp);
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = ProgressStore::load(&path).await;
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_transitions_persist() {
        let tmp = TempDir::new().unwrap();
        let path = doc_path(&tmp);
        let source = PathBuf::from("/in/a.txt");

        let store = ProgressStore::load(&path).await;
        store.mark_in_progress(&source).await;
        store.mark_done(&source).await;

        // Reload from disk: the transition survived.
        let store = ProgressStore::load(&path).await;
        assert!(store.has_done(&source).await);

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let map: HashMap<String, FileState> = serde_json::from_str(&text).unwrap();
        assert_eq!(map.get("/in/a.txt"), Some(&FileState::Done));
    }

    #[tokio::test]
    async fn test_state_wire_names() {
        let tmp = TempDir::new().unwrap();
        let path = doc_path(&tmp);
        let store = ProgressStore::load(&path).await;
        store.mark_in_progress(Path::new("/in/b.txt")).await;

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(text.contains("\"in-progress\""));
    }

    #[tokio::test]
    async fn test_mark_pending_all_keeps_done() {
        let tmp = TempDir::new().unwrap();
        let path = doc_path(&tmp);
        let done = PathBuf::from("/in/done.txt");
        let fresh = PathBuf::from("/in/fresh.txt");

        let store = ProgressStore::load(&path).await;
        store.mark_done(&done).await;
        store
            .mark_pending_all(&[done.clone(), fresh.clone()])
            .await;

        assert!(store.has_done(&done).await);
        assert!(!store.has_done(&fresh).await);
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.get("/in/fresh.txt"), Some(&FileState::Pending));
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let tmp = TempDir::new().unwrap();
        let path = doc_path(&tmp);
        let store = ProgressStore::load(&path).await;
        store.mark_done(Path::new("/in/a.txt")).await;

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }
}
