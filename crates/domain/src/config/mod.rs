mod engine;
mod limits;
mod llm;
mod observability;
mod store;
mod tools;

pub use engine::*;
pub use limits::*;
pub use llm::*;
pub use observability::*;
pub use store::*;
pub use tools::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: &str, message: &str) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: &str) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.llm.base_url.trim().is_empty() {
            errors.push(ConfigError::error("llm.base_url", "base_url must not be empty"));
        }
        if self.llm.default_model.trim().is_empty() {
            errors.push(ConfigError::error(
                "llm.default_model",
                "default_model must not be empty",
            ));
        }
        if self.llm.request_timeout_ms == 0 {
            errors.push(ConfigError::error(
                "llm.request_timeout_ms",
                "request timeout must be greater than 0",
            ));
        }
        if self.llm.retry.max_attempts == 0 {
            errors.push(ConfigError::error(
                "llm.retry.max_attempts",
                "at least one attempt is required",
            ));
        }
        if self.llm.retry.base_delay_ms == 0 {
            errors.push(ConfigError::warning(
                "llm.retry.base_delay_ms",
                "zero backoff retries immediately against a struggling API",
            ));
        }

        if self.engine.max_rounds == 0 {
            errors.push(ConfigError::error("engine.max_rounds", "round ceiling must be at least 1"));
        }
        if self.engine.max_history == 0 {
            errors.push(ConfigError::error("engine.max_history", "max_history must be at least 1"));
        }
        if self.engine.tool_timeout_ms == 0 {
            errors.push(ConfigError::error(
                "engine.tool_timeout_ms",
                "tool timeout must be greater than 0",
            ));
        }

        let limits = [
            ("limits.max_block_bytes", self.limits.max_block_bytes),
            ("limits.max_tool_result_bytes", self.limits.max_tool_result_bytes),
            ("limits.image_retention_turns", self.limits.image_retention_turns),
            ("limits.outbound_split_chars", self.limits.outbound_split_chars),
        ];
        for (field, value) in limits {
            if value == 0 {
                errors.push(ConfigError::error(field, "limit must be greater than 0"));
            }
        }

        if self.tools.timezone.parse::<chrono_tz::Tz>().is_err() {
            errors.push(ConfigError::error(
                "tools.timezone",
                "not a recognised IANA timezone",
            ));
        }

        errors.extend(self.observability.issues());

        errors
    }
}
