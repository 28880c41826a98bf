//! In-memory conversation cache.
//!
//! Once a conversation is loaded the cache is authoritative; the history
//! store is the crash-recovery copy. Writers are confined to the turn
//! engine, which holds the conversation lock; everyone else gets copies.

use std::collections::HashMap;

use parking_lot::RwLock;

use pl_domain::tool::Turn;

#[derive(Debug, Clone, Default)]
struct CachedConversation {
    turns: Vec<Turn>,
    /// The last save of `turns` failed; retry before the next turn.
    dirty: bool,
}

#[derive(Default)]
pub struct ConversationCache {
    entries: RwLock<HashMap<String, CachedConversation>>,
}

impl ConversationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the cached turns, if the conversation is loaded.
    pub fn get(&self, key: &str) -> Option<Vec<Turn>> {
        self.entries.read().get(key).map(|c| c.turns.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn is_dirty(&self, key: &str) -> bool {
        self.entries.read().get(key).is_some_and(|c| c.dirty)
    }

    /// Replace a conversation's turns. `dirty` records whether the store
    /// is behind the cache.
    pub(super) fn replace(&self, key: &str, turns: Vec<Turn>, dirty: bool) {
        self.entries
            .write()
            .insert(key.to_owned(), CachedConversation { turns, dirty });
    }

    pub(super) fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_and_dirty_tracking() {
        let cache = ConversationCache::new();
        assert!(cache.get("c").is_none());
        assert!(!cache.is_dirty("c"));

        cache.replace("c", vec![Turn::user_text("hi")], true);
        assert!(cache.contains("c"));
        assert!(cache.is_dirty("c"));
        assert_eq!(cache.get("c").unwrap().len(), 1);

        cache.replace("c", vec![Turn::user_text("hi")], false);
        assert!(!cache.is_dirty("c"));

        cache.remove("c");
        assert!(cache.is_empty());
    }
}
