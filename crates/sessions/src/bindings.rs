//! Per-conversation bindings: active repository, branch and model.
//!
//! Persisted in `bindings.json` under the configured state path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use pl_domain::error::{Error, Result};

use crate::fs_util::write_atomic;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// `owner/name`.
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    /// Full model identifier overriding the configured default.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

pub struct BindingStore {
    path: PathBuf,
    bindings: RwLock<HashMap<String, Binding>>,
}

impl BindingStore {
    /// Load or create the binding store at `state_path/bindings.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let path = state_path.join("bindings.json");
        let bindings = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, path = %path.display(), "bindings unreadable, starting empty");
                HashMap::new()
            })
        } else {
            HashMap::new()
        };

        tracing::info!(bindings = bindings.len(), path = %path.display(), "binding store loaded");

        Ok(Self {
            path,
            bindings: RwLock::new(bindings),
        })
    }

    pub fn get(&self, key: &str) -> Binding {
        self.bindings.read().get(key).cloned().unwrap_or_default()
    }

    pub fn model(&self, key: &str) -> Option<String> {
        self.bindings.read().get(key).and_then(|b| b.model.clone())
    }

    /// Bind a repository. Switching repos drops the branch binding.
    pub fn set_repo(&self, key: &str, repo: &str) -> Result<()> {
        let repo = repo.trim();
        if !is_repo_slug(repo) {
            return Err(Error::Other(format!("'{repo}' is not in owner/name form")));
        }
        self.update(key, |b| {
            if b.repo.as_deref() != Some(repo) {
                b.branch = None;
            }
            b.repo = Some(repo.to_owned());
        })
    }

    pub fn set_branch(&self, key: &str, branch: Option<&str>) -> Result<()> {
        let branch = branch.map(str::trim).filter(|b| !b.is_empty());
        self.update(key, |b| b.branch = branch.map(String::from))
    }

    pub fn set_model(&self, key: &str, model: Option<&str>) -> Result<()> {
        self.update(key, |b| b.model = model.map(String::from))
    }

    /// Reset hook: the branch does not survive a conversation reset, the
    /// repo and model do.
    pub fn clear_branch(&self, key: &str) -> Result<()> {
        if self.get(key).branch.is_none() {
            return Ok(());
        }
        self.set_branch(key, None)
    }

    fn update(&self, key: &str, f: impl FnOnce(&mut Binding)) -> Result<()> {
        {
            let mut bindings = self.bindings.write();
            let entry = bindings.entry(key.to_owned()).or_default();
            f(entry);
            entry.updated_at = Utc::now();
        }
        self.flush()
    }

    /// Persist the current bindings to disk.
    pub fn flush(&self) -> Result<()> {
        let json = {
            let bindings = self.bindings.read();
            serde_json::to_vec_pretty(&*bindings)?
        };
        write_atomic(&self.path, &json)
    }
}

fn is_repo_slug(s: &str) -> bool {
    let mut parts = s.split('/');
    let valid = |p: &str| {
        !p.is_empty()
            && p.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    matches!((parts.next(), parts.next(), parts.next()), (Some(o), Some(n), None) if valid(o) && valid(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_switch_clears_branch() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = BindingStore::new(dir.path()).unwrap();
        store.set_repo("c", "acme/widgets").unwrap();
        store.set_branch("c", Some("feature/x")).unwrap();
        assert_eq!(store.get("c").branch.as_deref(), Some("feature/x"));

        // Same repo keeps the branch.
        store.set_repo("c", "acme/widgets").unwrap();
        assert_eq!(store.get("c").branch.as_deref(), Some("feature/x"));

        store.set_repo("c", "acme/gadgets").unwrap();
        assert!(store.get("c").branch.is_none());
    }

    #[test]
    fn rejects_bad_repo_slug() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = BindingStore::new(dir.path()).unwrap();
        assert!(store.set_repo("c", "widgets").is_err());
        assert!(store.set_repo("c", "a/b/c").is_err());
        assert!(store.set_repo("c", "a b/c").is_err());
        assert!(store.get("c").repo.is_none());
    }

    #[test]
    fn bindings_survive_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let store = BindingStore::new(dir.path()).unwrap();
            store.set_repo("c", "acme/widgets").unwrap();
            store.set_model("c", Some("claude-opus-4-6")).unwrap();
        }
        let store = BindingStore::new(dir.path()).unwrap();
        assert_eq!(store.get("c").repo.as_deref(), Some("acme/widgets"));
        assert_eq!(store.model("c").as_deref(), Some("claude-opus-4-6"));
        assert!(store.model("other").is_none());
    }

    #[test]
    fn clear_branch_keeps_repo_and_model() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = BindingStore::new(dir.path()).unwrap();
        store.set_repo("c", "acme/widgets").unwrap();
        store.set_branch("c", Some("main")).unwrap();
        store.set_model("c", Some("claude-haiku-4-5-20251001")).unwrap();
        store.clear_branch("c").unwrap();
        let b = store.get("c");
        assert!(b.branch.is_none());
        assert_eq!(b.repo.as_deref(), Some("acme/widgets"));
        assert!(b.model.is_some());
    }
}
