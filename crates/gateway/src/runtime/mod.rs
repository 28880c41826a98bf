//! Turn engine.
//!
//! [`submit_turn`] is the single entry point a transport calls. It
//! serializes turns per conversation, runs the round loop against a
//! working copy of the history, and either commits that copy (governed,
//! persisted, cached) or rolls back to the pre-turn snapshot.

pub mod cache;
pub mod cancel;
pub mod session_lock;
pub mod tools;
pub mod turn;

use std::time::Instant;

use tracing::Instrument;

use pl_contextpack::{govern, sanitize, split_outbound};
use pl_domain::error::Error;
use pl_domain::redact::preview;
use pl_domain::tool::{ContentBlock, Turn};
use pl_domain::trace::TraceEvent;
use pl_providers::{ApiError, Usage};
use pl_sessions::AuditEntry;

use crate::state::AppState;

use self::turn::{enter, run_rounds, RoundContext, RoundFailure, RoundOutcome, TurnPhase};

/// Max chars of user text recorded in a `turn_received` audit entry.
const AUDIT_TEXT_PREVIEW: usize = 80;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inputs, outputs, failures
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One inbound user turn.
#[derive(Debug, Clone)]
pub struct TurnInput {
    /// Opaque, transport-assigned conversation key.
    pub conversation_key: String,
    pub content: Vec<ContentBlock>,
    /// Transport-level user identity, recorded in the audit log.
    pub user_id: Option<String>,
    /// Model override for this turn only. `None` uses the conversation's
    /// bound model, then the configured default.
    pub model: Option<String>,
}

impl TurnInput {
    pub fn text(conversation_key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            conversation_key: conversation_key.into(),
            content: vec![ContentBlock::text(text)],
            user_id: None,
            model: None,
        }
    }
}

/// A successful turn.
#[derive(Debug, Clone)]
pub struct TurnReply {
    /// Full reply text.
    pub text: String,
    /// `text` split for the transport's message length limit.
    pub chunks: Vec<String>,
    /// Completion calls made for this turn.
    pub rounds: u32,
    pub usage: Usage,
    /// Turns kept in the conversation after governance.
    pub history_len: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum TurnFailure {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("round ceiling of {ceiling} reached")]
    RoundLimitExceeded { ceiling: u32 },

    #[error("turn cancelled")]
    Cancelled,

    #[error("no sendable content in turn")]
    EmptyInput,

    #[error("loading history: {0}")]
    Store(#[source] Error),
}

impl TurnFailure {
    /// Short, stable text for the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            TurnFailure::Api(_) => "The assistant is unavailable right now. Please try again.",
            TurnFailure::RoundLimitExceeded { .. } => {
                "Too many tool rounds; the request was abandoned."
            }
            TurnFailure::Cancelled => "Request cancelled.",
            TurnFailure::EmptyInput => "Nothing to send.",
            TurnFailure::Store(_) => "Conversation history could not be loaded.",
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            TurnFailure::Api(_) => "api_error",
            TurnFailure::RoundLimitExceeded { .. } => "round_limit_exceeded",
            TurnFailure::Cancelled => "cancelled",
            TurnFailure::EmptyInput => "empty_input",
            TurnFailure::Store(_) => "store_error",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// submit_turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process one inbound user turn to completion.
///
/// Turns for the same conversation run one at a time in arrival order.
/// On any failure the conversation's history is left exactly as it was
/// before the turn.
pub async fn submit_turn(state: &AppState, input: TurnInput) -> Result<TurnReply, TurnFailure> {
    let key = input.conversation_key.clone();
    let turn_span = tracing::info_span!(
        "turn",
        conversation = %key,
        "otel.kind" = "SERVER",
    );
    async move {
        let content = inbound_content(input.content);
        if content.is_empty() {
            tracing::debug!("inbound turn has no sendable content");
            return Err(TurnFailure::EmptyInput);
        }

        audit(
            state,
            "turn_received",
            &key,
            input.user_id.as_deref(),
            preview(&Turn::user(content.clone()).text(), AUDIT_TEXT_PREVIEW),
        );

        if state.locks.is_held(&key) {
            tracing::debug!("conversation busy, queued behind running turn");
        }
        let _guard = state.locks.acquire(&key).await.map_err(|e| {
            tracing::error!(error = %e, "conversation lock unavailable");
            TurnFailure::Cancelled
        })?;

        let cancel = state.cancel_map.register(&key);
        let ctx = RoundContext {
            state,
            conversation: &key,
            user_id: input.user_id.as_deref(),
            model: resolve_turn_model(state, &key, input.model.as_deref()),
            system: system_prompt(state, &key),
            cancel: &cancel,
        };
        let result = run_locked(&ctx, content).await;
        state.cancel_map.remove(&key);

        if let Err(failure) = &result {
            audit(
                state,
                "turn_failed",
                &key,
                input.user_id.as_deref(),
                failure.to_string(),
            );
        }
        result
    }
    .instrument(turn_span)
    .await
}

/// The body of a turn, run while holding the conversation lock.
async fn run_locked(ctx: &RoundContext<'_>, content: Vec<ContentBlock>) -> Result<TurnReply, TurnFailure> {
    let state = ctx.state;
    let key = ctx.conversation;
    let started = Instant::now();

    enter(TurnPhase::Idle, 0);
    let snapshot = load_conversation(state, key).await?;

    TraceEvent::TurnStarted {
        conversation: key.to_string(),
        history_len: snapshot.len(),
        model: ctx.model.clone(),
    }
    .emit();

    let mut working = snapshot.clone();
    working.push(Turn::user(content));

    match run_rounds(ctx, working).await {
        Ok(outcome) => Ok(finalize(state, key, outcome, started).await),
        Err(RoundFailure { failure, rounds }) => {
            roll_back(state, key, &snapshot, &failure, rounds).await;
            Err(failure)
        }
    }
}

/// Commit a finished round loop: govern, persist, replace the cache.
async fn finalize(state: &AppState, key: &str, outcome: RoundOutcome, started: Instant) -> TurnReply {
    let RoundOutcome {
        mut turns,
        reply,
        rounds,
        usage,
    } = outcome;

    enter(TurnPhase::Finalizing, rounds);
    govern(&mut turns, &state.limits);
    let history_len = turns.len();
    persist(state, key, turns).await;

    TraceEvent::TurnCompleted {
        conversation: key.to_string(),
        rounds,
        history_len,
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        duration_ms: started.elapsed().as_millis() as u64,
    }
    .emit();

    let chunks = split_outbound(&reply, state.config.limits.outbound_split_chars);
    TurnReply {
        text: reply,
        chunks,
        rounds,
        usage,
        history_len,
    }
}

/// Discard the working history. The cache still holds the snapshot; the
/// store is only touched when it is known to be behind.
async fn roll_back(state: &AppState, key: &str, snapshot: &[Turn], failure: &TurnFailure, rounds: u32) {
    enter(TurnPhase::RolledBack, rounds);
    match failure {
        TurnFailure::Api(e) => tracing::warn!(rounds, error = %e, "turn failed, rolling back"),
        other => tracing::info!(rounds, reason = other.reason(), "turn abandoned, rolling back"),
    }
    TraceEvent::TurnRolledBack {
        conversation: key.to_string(),
        rounds,
        reason: failure.reason().to_string(),
    }
    .emit();

    if state.cache.is_dirty(key) {
        persist(state, key, snapshot.to_vec()).await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cache + store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The pre-turn snapshot: cached turns when loaded (retrying a failed
/// save first), otherwise the stored history, sanitized and cached.
async fn load_conversation(state: &AppState, key: &str) -> Result<Vec<Turn>, TurnFailure> {
    if let Some(turns) = state.cache.get(key) {
        if state.cache.is_dirty(key) {
            tracing::info!("retrying persistence of previous turn");
            persist(state, key, turns.clone()).await;
        }
        return Ok(turns);
    }

    let stored = state.history.load_history(key).await.map_err(|e| {
        tracing::error!(error = %e, "failed to load conversation history");
        TurnFailure::Store(e)
    })?;
    let turns = sanitize(stored);
    tracing::debug!(turns = turns.len(), "conversation loaded into cache");
    state.cache.replace(key, turns.clone(), false);
    Ok(turns)
}

/// Save `turns` and make them the cached state. A failed save leaves the
/// cache authoritative and marked dirty for a later retry.
async fn persist(state: &AppState, key: &str, turns: Vec<Turn>) {
    match state.history.save_history(key, &turns).await {
        Ok(()) => state.cache.replace(key, turns, false),
        Err(e) => {
            tracing::warn!(error = %e, "history persist failed, will retry on next turn");
            TraceEvent::PersistFailed {
                conversation: key.to_string(),
                error: e.to_string(),
            }
            .emit();
            state.cache.replace(key, turns, true);
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Other operations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drop cached and persisted history for `key`.
///
/// Waits for any running turn on the conversation to finish first.
/// The branch binding does not survive a reset; repo and model do.
pub async fn clear_conversation(state: &AppState, key: &str) -> pl_domain::Result<()> {
    let _guard = state
        .locks
        .acquire(key)
        .await
        .map_err(|e| Error::Other(e.to_string()))?;

    state.history.clear_history(key).await?;
    state.cache.remove(key);
    if let Err(e) = state.bindings.clear_branch(key) {
        tracing::warn!(conversation = %key, error = %e, "failed to clear branch binding");
    }

    TraceEvent::ConversationCleared {
        conversation: key.to_string(),
    }
    .emit();
    audit(state, "conversation_cleared", key, None, String::new());
    Ok(())
}

/// Read-only view of a conversation for display: the cache when loaded,
/// otherwise the store.
pub async fn cached_history(state: &AppState, key: &str) -> pl_domain::Result<Vec<Turn>> {
    match state.cache.get(key) {
        Some(turns) => Ok(turns),
        None => state.history.load_history(key).await,
    }
}

/// Request cancellation of the turn in flight for `key`. Returns whether
/// there was one.
pub fn cancel(state: &AppState, key: &str) -> bool {
    let found = state.cancel_map.cancel(key);
    if found {
        tracing::info!(conversation = %key, "cancellation requested");
    }
    found
}

/// Whether a turn currently holds the lock for `key`.
pub fn is_busy(state: &AppState, key: &str) -> bool {
    state.locks.is_held(key)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Inbound content may not carry tool blocks; those only come from the
/// round loop. Blank text blocks are dropped too.
fn inbound_content(content: Vec<ContentBlock>) -> Vec<ContentBlock> {
    content
        .into_iter()
        .filter(|b| match b {
            ContentBlock::Text { text } => !text.trim().is_empty(),
            ContentBlock::Image { .. } | ContentBlock::Document { .. } => true,
            ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. } => false,
        })
        .collect()
}

/// Per-turn override, then the conversation's bound model, then the
/// configured default.
fn resolve_turn_model(state: &AppState, key: &str, requested: Option<&str>) -> String {
    if let Some(name) = requested {
        match state.config.llm.resolve_model(name) {
            Some(model) => return model,
            None => tracing::warn!(model = %name, "unknown model override ignored"),
        }
    }
    state
        .bindings
        .model(key)
        .unwrap_or_else(|| state.config.llm.default_model.clone())
}

/// The configured system prompt plus the conversation's repo binding.
fn system_prompt(state: &AppState, key: &str) -> Option<String> {
    let mut prompt = state.config.llm.system_prompt.trim().to_string();
    let binding = state.bindings.get(key);
    if let Some(repo) = binding.repo {
        if !prompt.is_empty() {
            prompt.push_str("\n\n");
        }
        prompt.push_str(&format!("Active repository: {repo}"));
        if let Some(branch) = binding.branch {
            prompt.push_str(&format!(" (branch: {branch})"));
        }
    }
    (!prompt.is_empty()).then_some(prompt)
}

fn audit(state: &AppState, event: &str, key: &str, user_id: Option<&str>, detail: String) {
    let mut entry = AuditEntry::new(event, key, detail);
    if let Some(uid) = user_id {
        entry = entry.with_user(uid);
    }
    state.audit.append(entry);
}
