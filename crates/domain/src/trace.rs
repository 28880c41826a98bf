use serde::Serialize;

/// Structured trace events emitted across all parley crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    TurnStarted {
        conversation: String,
        history_len: usize,
        model: String,
    },
    TurnCompleted {
        conversation: String,
        rounds: u32,
        history_len: usize,
        input_tokens: u32,
        output_tokens: u32,
        duration_ms: u64,
    },
    TurnRolledBack {
        conversation: String,
        rounds: u32,
        reason: String,
    },
    CompletionAttempt {
        provider: String,
        model: String,
        attempt: u32,
        duration_ms: u64,
        stop_reason: Option<String>,
        input_tokens: Option<u32>,
        output_tokens: Option<u32>,
    },
    CompletionRetry {
        provider: String,
        attempt: u32,
        delay_ms: u64,
        reason: String,
    },
    ToolDispatched {
        conversation: String,
        tool: String,
        call_id: String,
        is_error: bool,
        duration_ms: u64,
    },
    HistorySanitized {
        before: usize,
        after: usize,
    },
    HistoryGoverned {
        media_stripped: usize,
        blocks_truncated: usize,
        turns_evicted: usize,
    },
    HistoryPersisted {
        conversation: String,
        turns: usize,
    },
    PersistFailed {
        conversation: String,
        error: String,
    },
    ConversationCleared {
        conversation: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "pl_event");
    }
}
