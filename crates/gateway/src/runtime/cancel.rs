//! Per-conversation cancellation tokens.
//!
//! Each running turn gets a `CancelToken`. Calling `cancel()` on it asks
//! the turn engine to stop at its next suspension boundary: the turn is
//! rolled back and fails with `TurnFailure::Cancelled`. An external call
//! already in flight is allowed to finish.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A cancellation token that can be checked by the round loop.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the token of the turn currently running for each conversation.
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelMap {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Create and register a new cancel token for a conversation.
    pub fn register(&self, key: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(key.to_owned(), token.clone());
        token
    }

    /// Cancel the running turn for a conversation. Returns true if a
    /// token was found.
    pub fn cancel(&self, key: &str) -> bool {
        match self.tokens.lock().get(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the token for a conversation (called when a turn ends).
    pub fn remove(&self, key: &str) {
        self.tokens.lock().remove(key);
    }

    /// Check if a conversation has a registered (running) turn.
    pub fn is_running(&self, key: &str) -> bool {
        self.tokens.lock().contains_key(key)
    }
}
