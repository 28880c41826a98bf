//! Durable per-conversation history.
//!
//! Each conversation key maps to one JSON document under
//! `<state_path>/conversations/`. The file name is the SHA-256 of the key
//! so transport-assigned keys never need escaping. Writes go to a temp
//! file that is renamed over the target, so a crash mid-write leaves the
//! previous history intact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use pl_domain::error::{Error, Result};
use pl_domain::tool::Turn;
use pl_domain::trace::TraceEvent;

use crate::fs_util::write_atomic;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Persistence boundary for conversation histories.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load the stored turns for `key`. A key never saved yields an empty
    /// history.
    async fn load_history(&self, key: &str) -> Result<Vec<Turn>>;

    /// Replace the stored turns for `key`.
    async fn save_history(&self, key: &str, turns: &[Turn]) -> Result<()>;

    /// Remove everything stored for `key`. Clearing an unknown key is
    /// not an error.
    async fn clear_history(&self, key: &str) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// File-backed store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize, Deserialize)]
struct HistoryDocument {
    key: String,
    updated_at: DateTime<Utc>,
    turns: Vec<Turn>,
}

pub struct FileHistoryStore {
    dir: PathBuf,
}

impl FileHistoryStore {
    /// Open (and create if needed) `state_path/conversations`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("conversations");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;
        tracing::info!(path = %dir.display(), "history store ready");
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key_digest(key)))
    }
}

/// Hex SHA-256 of a conversation key.
pub fn key_digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn load_history(&self, key: &str) -> Result<Vec<Turn>> {
        let path = self.path_for(key);
        let owned_key = key.to_owned();

        tokio::task::spawn_blocking(move || {
            let raw = match std::fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(Error::Io(e)),
            };
            let doc: HistoryDocument = serde_json::from_str(&raw).map_err(|e| {
                Error::Store(format!("corrupt history for {owned_key}: {e}"))
            })?;
            if doc.key != owned_key {
                return Err(Error::Store(format!(
                    "history file {} belongs to a different key",
                    path.display()
                )));
            }
            Ok(doc.turns)
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))?
    }

    async fn save_history(&self, key: &str, turns: &[Turn]) -> Result<()> {
        let doc = HistoryDocument {
            key: key.to_owned(),
            updated_at: Utc::now(),
            turns: turns.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&doc)?;
        let path = self.path_for(key);

        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;

        TraceEvent::HistoryPersisted {
            conversation: key.to_owned(),
            turns: turns.len(),
        }
        .emit();
        Ok(())
    }

    async fn clear_history(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))?
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process-local store for tests and ephemeral runs.
///
/// Saves can be made to fail on demand to exercise persistence retry.
#[derive(Default)]
pub struct MemoryHistoryStore {
    histories: RwLock<HashMap<String, Vec<Turn>>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a history directly, bypassing the save counter.
    pub fn insert(&self, key: &str, turns: Vec<Turn>) {
        self.histories.write().insert(key.to_owned(), turns);
    }

    /// What is currently persisted for `key`.
    pub fn stored(&self, key: &str) -> Option<Vec<Turn>> {
        self.histories.read().get(key).cloned()
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn load_history(&self, key: &str) -> Result<Vec<Turn>> {
        Ok(self.stored(key).unwrap_or_default())
    }

    async fn save_history(&self, key: &str, turns: &[Turn]) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Store("injected save failure".into()));
        }
        self.histories.write().insert(key.to_owned(), turns.to_vec());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear_history(&self, key: &str) -> Result<()> {
        self.histories.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_domain::tool::ContentBlock;
    use serde_json::json;

    fn sample() -> Vec<Turn> {
        vec![
            Turn::user_text("list my open issues"),
            Turn::assistant(vec![ContentBlock::tool_use("tu_1", "list_issues", json!({}))]),
            Turn::user(vec![ContentBlock::tool_result("tu_1", "[]", false)]),
            Turn::assistant_text("You have no open issues."),
        ]
    }

    #[tokio::test]
    async fn file_store_roundtrip_and_clear() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileHistoryStore::new(dir.path()).unwrap();

        assert!(store.load_history("chat:1").await.unwrap().is_empty());

        store.save_history("chat:1", &sample()).await.unwrap();
        assert_eq!(store.load_history("chat:1").await.unwrap(), sample());
        assert!(store.load_history("chat:2").await.unwrap().is_empty());

        store.clear_history("chat:1").await.unwrap();
        assert!(store.load_history("chat:1").await.unwrap().is_empty());
        store.clear_history("chat:1").await.unwrap();
    }

    #[tokio::test]
    async fn file_store_leaves_no_temp_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileHistoryStore::new(dir.path()).unwrap();
        store.save_history("k", &sample()).await.unwrap();
        store.save_history("k", &sample()[..1]).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path().join("conversations"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{}.json", key_digest("k"))]);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_store_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileHistoryStore::new(dir.path()).unwrap();
        std::fs::write(store.path_for("bad"), "{not json").unwrap();
        let err = store.load_history("bad").await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[tokio::test]
    async fn memory_store_injected_failure() {
        let store = MemoryHistoryStore::new();
        store.set_fail_saves(true);
        assert!(store.save_history("k", &sample()).await.is_err());
        assert!(store.stored("k").is_none());
        store.set_fail_saves(false);
        store.save_history("k", &sample()).await.unwrap();
        assert_eq!(store.save_count(), 1);
    }
}
