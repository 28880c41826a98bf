//! AppState construction shared by every CLI command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use pl_domain::config::{Config, ConfigSeverity};
use pl_domain::Error;
use pl_providers::{AnthropicProvider, CompletionClient};
use pl_sessions::{AuditLog, BindingStore, FileHistoryStore};
use pl_tools::{CurrentTimeTool, ToolRegistry};

use crate::state::AppState;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
///
/// A missing API key is not an error here: the state simply has no
/// completion client. Commands that run turns check
/// [`require_provider`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }

    // ── Completion provider ──────────────────────────────────────────
    let llm = match AnthropicProvider::from_config(&config.llm) {
        Ok(provider) => {
            let client = CompletionClient::from_config(Arc::new(provider), &config.llm);
            tracing::info!(
                provider = %client.provider_id(),
                model = %config.llm.default_model,
                max_attempts = config.llm.retry.max_attempts,
                "completion client ready"
            );
            Some(Arc::new(client))
        }
        Err(Error::Auth(reason)) => {
            tracing::info!(
                env = %config.llm.api_key_env,
                reason = %reason,
                "no completion provider, set the API key to enable turns"
            );
            None
        }
        Err(e) => {
            return Err(anyhow::Error::new(e).context("initializing completion provider"));
        }
    };

    // ── Tools ────────────────────────────────────────────────────────
    let tools = Arc::new(build_tool_registry(&config));
    tracing::info!(tools = tools.len(), "tool registry ready");

    // ── Persistence ──────────────────────────────────────────────────
    let state_path = &config.store.state_path;
    let history = Arc::new(
        FileHistoryStore::new(state_path).context("initializing history store")?,
    );
    tracing::info!(path = %state_path.display(), "history store ready");

    let audit = if config.store.audit {
        Arc::new(AuditLog::new(state_path).context("initializing audit log")?)
    } else {
        tracing::info!("audit log disabled");
        Arc::new(AuditLog::disabled())
    };

    let bindings = Arc::new(BindingStore::new(state_path).context("loading bindings")?);

    Ok(AppState::new(config, llm, tools, history, audit, bindings))
}

/// Register the built-in capabilities, minus any disabled by config.
pub fn build_tool_registry(config: &Config) -> ToolRegistry {
    let mut registry = ToolRegistry::new(Duration::from_millis(config.engine.tool_timeout_ms));
    registry.register(
        CurrentTimeTool::definition(),
        Arc::new(CurrentTimeTool::new(config.tools.timezone.clone())),
    );

    for name in &config.tools.disabled {
        if registry.unregister(name) {
            tracing::info!(tool = %name, "tool disabled by config");
        } else {
            tracing::warn!(tool = %name, "tools.disabled names an unknown tool");
        }
    }
    registry
}

/// Fail early for commands that need a completion provider.
pub fn require_provider(state: &AppState) -> anyhow::Result<()> {
    if state.llm.is_none() {
        anyhow::bail!(
            "no completion provider: set {} to run turns",
            state.config.llm.api_key_env
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_tools_are_not_registered() {
        let mut config = Config::default();
        assert!(build_tool_registry(&config).contains("current_time"));

        config.tools.disabled = vec!["current_time".into()];
        assert!(build_tool_registry(&config).is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = Config::default();
        config.engine.max_rounds = 0;
        assert!(build_app_state(Arc::new(config)).is_err());
    }
}
