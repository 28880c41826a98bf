//! Per-conversation concurrency control.
//!
//! Ensures only one turn runs per conversation at a time. A second turn
//! arriving while one is in flight waits its turn; waiters are served in
//! arrival order.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Manages per-conversation run locks.
///
/// Each conversation key maps to a `Semaphore(1)`. Tokio semaphores are
/// fair, so queued turns acquire the permit in the order they asked for
/// it. Locks are created lazily and kept for the process lifetime.
pub struct ConversationLocks {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for ConversationLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn semaphore(&self, key: &str) -> Arc<Semaphore> {
        self.locks
            .lock()
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    /// Acquire the run lock for a conversation.
    ///
    /// Hold the permit for the duration of the turn; it releases on drop.
    pub async fn acquire(&self, key: &str) -> Result<ConversationGuard, LockClosed> {
        let permit = self
            .semaphore(key)
            .acquire_owned()
            .await
            .map_err(|_| LockClosed)?;
        Ok(ConversationGuard { _permit: permit })
    }

    /// Whether a turn currently holds the lock for `key`.
    pub fn is_held(&self, key: &str) -> bool {
        self.locks
            .lock()
            .get(key)
            .is_some_and(|sem| sem.available_permits() == 0)
    }

    /// Number of tracked conversations (for monitoring).
    pub fn conversation_count(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Exclusive access to one conversation. Released on drop.
pub struct ConversationGuard {
    _permit: OwnedSemaphorePermit,
}

/// The lock's semaphore was closed; the turn cannot run.
#[derive(Debug, thiserror::Error)]
#[error("conversation lock closed")]
pub struct LockClosed;
