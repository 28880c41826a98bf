//! Durable state for parley conversations.
//!
//! Conversation histories behind the [`HistoryStore`] trait, the JSONL
//! audit log, and per-conversation repo / branch / model bindings.

pub mod audit;
pub mod bindings;
pub(crate) mod fs_util;
pub mod history;

pub use audit::{AuditEntry, AuditLog};
pub use bindings::{Binding, BindingStore};
pub use history::{FileHistoryStore, HistoryStore, MemoryHistoryStore};
