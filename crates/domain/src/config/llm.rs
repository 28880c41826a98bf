use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Completion API
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_provider_id")]
    pub provider_id: String,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    /// An unset variable means no completion provider is available.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_default_model")]
    pub default_model: String,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "d_system_prompt")]
    pub system_prompt: String,
    /// Bound on a single completion attempt.
    #[serde(default = "d_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Short names accepted by `/model` (e.g. `sonnet`).
    #[serde(default = "d_model_aliases")]
    pub model_aliases: HashMap<String, String>,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider_id: d_provider_id(),
            base_url: d_base_url(),
            api_key_env: d_api_key_env(),
            default_model: d_default_model(),
            max_tokens: d_max_tokens(),
            system_prompt: d_system_prompt(),
            request_timeout_ms: d_request_timeout_ms(),
            model_aliases: d_model_aliases(),
            retry: RetryConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Resolve a user-supplied model name: aliases first, then raw
    /// `claude-*` identifiers verbatim. Anything else is rejected.
    pub fn resolve_model(&self, name: &str) -> Option<String> {
        let name = name.trim();
        if let Some(model) = self.model_aliases.get(&name.to_lowercase()) {
            return Some(model.clone());
        }
        if name.starts_with("claude-") {
            return Some(name.to_string());
        }
        None
    }
}

/// Retry policy for transient completion failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each attempt after.
    #[serde(default = "d_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "d_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: d_max_attempts(),
            base_delay_ms: d_base_delay_ms(),
            max_delay_ms: d_max_delay_ms(),
        }
    }
}

fn d_provider_id() -> String {
    "anthropic".into()
}
fn d_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn d_api_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}
fn d_default_model() -> String {
    "claude-sonnet-4-5-20250929".into()
}
fn d_max_tokens() -> u32 {
    4096
}
fn d_system_prompt() -> String {
    "You are a helpful assistant. Use the available tools when they help \
     answer the user, and keep replies concise."
        .into()
}
fn d_request_timeout_ms() -> u64 {
    120_000
}
fn d_model_aliases() -> HashMap<String, String> {
    HashMap::from([
        ("opus".to_string(), "claude-opus-4-6".to_string()),
        ("sonnet".to_string(), "claude-sonnet-4-5-20250929".to_string()),
        ("haiku".to_string(), "claude-haiku-4-5-20251001".to_string()),
    ])
}
fn d_max_attempts() -> u32 {
    3
}
fn d_base_delay_ms() -> u64 {
    1_000
}
fn d_max_delay_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_alias_case_insensitive() {
        let cfg = LlmConfig::default();
        assert_eq!(cfg.resolve_model("Opus").as_deref(), Some("claude-opus-4-6"));
    }

    #[test]
    fn resolve_raw_claude_id() {
        let cfg = LlmConfig::default();
        assert_eq!(
            cfg.resolve_model("claude-3-5-haiku-latest").as_deref(),
            Some("claude-3-5-haiku-latest")
        );
        assert!(cfg.resolve_model("gpt-4o").is_none());
    }
}
