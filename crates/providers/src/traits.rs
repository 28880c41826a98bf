use pl_domain::error::Result;
use pl_domain::tool::{ContentBlock, ToolDefinition, Turn};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One completion call: the full conversation plus the tools on offer.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier to use for this call.
    pub model: String,
    /// Top-level system prompt, sent outside the turn list.
    pub system: Option<String>,
    /// Sanitized, governed history ending in a user turn.
    pub turns: Vec<Turn>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Other(String),
}

impl StopReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            other => StopReason::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::ToolUse => "tool_use",
            StopReason::MaxTokens => "max_tokens",
            StopReason::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn add(&mut self, other: Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// The stable result shape of one completion call.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Text and `tool_use` blocks, in the order the model produced them.
    pub blocks: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: Option<Usage>,
    /// The model that actually produced the response.
    pub model: String,
}

impl CompletionResponse {
    pub fn has_tool_use(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single-shot completion backend.
///
/// Implementations make exactly one request per call; timeouts and
/// retries belong to [`crate::CompletionClient`].
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a completion request and wait for the full response.
    async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResponse>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
