use std::sync::Arc;

use pl_contextpack::GovernorLimits;
use pl_domain::config::Config;
use pl_providers::CompletionClient;
use pl_sessions::{AuditLog, BindingStore, HistoryStore};
use pl_tools::ToolRegistry;

use crate::runtime::cache::ConversationCache;
use crate::runtime::cancel::CancelMap;
use crate::runtime::session_lock::ConversationLocks;

/// Shared application state passed to the turn engine and CLI commands.
///
/// Fields are grouped by concern:
/// - **Core services**: config, completion client, tools
/// - **Persistence**: history store, audit log, bindings
/// - **Runtime**: conversation locks, cancel map, cache
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    /// `None` when no API key is configured.
    pub llm: Option<Arc<CompletionClient>>,
    pub tools: Arc<ToolRegistry>,
    pub limits: GovernorLimits,

    // ── Persistence ───────────────────────────────────────────────────
    pub history: Arc<dyn HistoryStore>,
    pub audit: Arc<AuditLog>,
    pub bindings: Arc<BindingStore>,

    // ── Runtime ───────────────────────────────────────────────────────
    pub locks: Arc<ConversationLocks>,
    pub cancel_map: Arc<CancelMap>,
    /// Written only under the conversation lock; read via
    /// [`crate::runtime::cached_history`].
    pub(crate) cache: Arc<ConversationCache>,
}

impl AppState {
    /// Wire a state from already-initialized services. Runtime maps start
    /// empty.
    pub fn new(
        config: Arc<Config>,
        llm: Option<Arc<CompletionClient>>,
        tools: Arc<ToolRegistry>,
        history: Arc<dyn HistoryStore>,
        audit: Arc<AuditLog>,
        bindings: Arc<BindingStore>,
    ) -> Self {
        let limits = GovernorLimits::from_config(&config.limits, &config.engine);
        Self {
            config,
            llm,
            tools,
            limits,
            history,
            audit,
            bindings,
            locks: Arc::new(ConversationLocks::new()),
            cancel_map: Arc::new(CancelMap::new()),
            cache: Arc::new(ConversationCache::new()),
        }
    }
}
