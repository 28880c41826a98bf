//! Append-only JSONL audit log.
//!
//! Appends are best-effort: an I/O failure is logged and swallowed so
//! auditing can never fail a turn. Details are scrubbed of credentials
//! before they reach disk.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use pl_domain::error::{Error, Result};
use pl_domain::redact::redact_secrets;

/// A single audit line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub conversation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub detail: String,
}

impl AuditEntry {
    pub fn new(event: &str, conversation: &str, detail: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event: event.to_owned(),
            conversation: conversation.to_owned(),
            user_id: None,
            detail: detail.into(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

pub struct AuditLog {
    /// `None` disables auditing entirely.
    path: Option<PathBuf>,
    /// Serializes appends within the process.
    write_lock: Mutex<()>,
}

impl AuditLog {
    /// Audit to `state_path/audit.jsonl`.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        Ok(Self {
            path: Some(state_path.join("audit.jsonl")),
            write_lock: Mutex::new(()),
        })
    }

    pub fn disabled() -> Self {
        Self {
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Append one entry. Never fails; errors are logged.
    pub fn append(&self, mut entry: AuditEntry) {
        let Some(path) = self.path.as_ref() else {
            return;
        };
        entry.detail = redact_secrets(&entry.detail);

        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "audit entry not serializable");
                return;
            }
        };

        let _guard = self.write_lock.lock();
        if let Err(e) = append_line(path, &line) {
            tracing::warn!(
                event = %entry.event,
                conversation = %entry.conversation,
                error = %e,
                "audit append failed"
            );
        }
    }

    /// Most recent entries first, optionally only for one conversation.
    ///
    /// Malformed lines are skipped. A missing or unreadable log yields an
    /// empty list.
    pub fn recent(&self, limit: usize, conversation: Option<&str>) -> Vec<AuditEntry> {
        let Some(path) = self.path.as_ref() else {
            return Vec::new();
        };
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(error = %e, "audit log unreadable");
                }
                return Vec::new();
            }
        };

        raw.lines()
            .rev()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str::<AuditEntry>(l) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed audit line");
                    None
                }
            })
            .filter(|e| conversation.map_or(true, |c| e.conversation == c))
            .take(limit)
            .collect()
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")
}
