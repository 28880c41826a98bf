//! The round loop: call the model, dispatch requested tools, feed the
//! results back, until the model produces a final answer or the round
//! ceiling is reached.
//!
//! The loop only ever touches its own working copy of the history. The
//! caller decides whether that copy is committed or thrown away.

use tracing::Instrument;

use pl_contextpack::{govern, sanitize};
use pl_domain::tool::{ContentBlock, Turn};
use pl_providers::{ApiError, CompletionRequest, ErrorClass, StopReason, Usage};

use crate::state::AppState;

use super::cancel::CancelToken;
use super::tools::{dispatch_round, DispatchCancelled};
use super::TurnFailure;

/// Stored and returned when a final response carries no text.
pub const EMPTY_REPLY: &str = "(no output)";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where a turn is in its lifecycle. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Sanitizing,
    AwaitingCompletion,
    ToolDispatch,
    Finalizing,
    RolledBack,
}

impl TurnPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnPhase::Idle => "idle",
            TurnPhase::Sanitizing => "sanitizing",
            TurnPhase::AwaitingCompletion => "awaiting_completion",
            TurnPhase::ToolDispatch => "tool_dispatch",
            TurnPhase::Finalizing => "finalizing",
            TurnPhase::RolledBack => "rolled_back",
        }
    }
}

pub(super) fn enter(phase: TurnPhase, round: u32) {
    tracing::debug!(phase = phase.as_str(), round, "turn phase");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Round loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything a round loop needs that does not change between rounds.
pub(super) struct RoundContext<'a> {
    pub state: &'a AppState,
    pub conversation: &'a str,
    pub user_id: Option<&'a str>,
    pub model: String,
    pub system: Option<String>,
    pub cancel: &'a CancelToken,
}

/// A completed round loop: the working history ending in the final
/// assistant turn.
pub(super) struct RoundOutcome {
    pub turns: Vec<Turn>,
    pub reply: String,
    pub rounds: u32,
    pub usage: Usage,
}

/// A failed round loop. The working history is discarded.
pub(super) struct RoundFailure {
    pub failure: TurnFailure,
    pub rounds: u32,
}

/// Run rounds over `working`, which must end with the new user turn.
pub(super) async fn run_rounds(
    ctx: &RoundContext<'_>,
    mut working: Vec<Turn>,
) -> Result<RoundOutcome, RoundFailure> {
    let state = ctx.state;
    let ceiling = state.config.engine.max_rounds;
    let tools = state.tools.definitions();
    let mut usage = Usage::default();
    let mut rounds: u32 = 0;

    let Some(client) = state.llm.as_ref() else {
        return Err(RoundFailure {
            failure: TurnFailure::Api(no_provider()),
            rounds,
        });
    };

    loop {
        // ── Cancellation boundary before each completion call ────────
        if ctx.cancel.is_cancelled() {
            return Err(RoundFailure {
                failure: TurnFailure::Cancelled,
                rounds,
            });
        }
        rounds += 1;

        enter(TurnPhase::Sanitizing, rounds);
        working = sanitize(working);
        govern(&mut working, &state.limits);

        enter(TurnPhase::AwaitingCompletion, rounds);
        let request = CompletionRequest {
            model: ctx.model.clone(),
            system: ctx.system.clone(),
            turns: working.clone(),
            tools: tools.clone(),
            max_tokens: state.config.llm.max_tokens,
        };
        let llm_span = tracing::info_span!(
            "llm.call",
            provider = %client.provider_id(),
            model = %ctx.model,
            round = rounds,
        );
        let response = match client.complete(&request).instrument(llm_span).await {
            Ok(resp) => resp,
            Err(e) => {
                return Err(RoundFailure {
                    failure: TurnFailure::Api(e),
                    rounds,
                });
            }
        };
        if let Some(u) = response.usage {
            usage.add(u);
        }

        // ── Terminal responses ───────────────────────────────────────
        if response.stop_reason != StopReason::ToolUse || !response.has_tool_use() {
            if response.has_tool_use() {
                tracing::warn!(
                    stop_reason = response.stop_reason.as_str(),
                    "discarding tool_use blocks from a terminal response"
                );
            }
            let final_turn = final_assistant_turn(response.blocks);
            let reply = final_turn.text();
            working.push(final_turn);
            tracing::debug!(
                rounds,
                stop_reason = response.stop_reason.as_str(),
                "model produced final answer"
            );
            return Ok(RoundOutcome {
                turns: working,
                reply,
                rounds,
                usage,
            });
        }

        // ── Tool round ───────────────────────────────────────────────
        enter(TurnPhase::ToolDispatch, rounds);
        let call_turn = Turn::assistant(response.blocks);
        let calls = call_turn.tool_calls();
        tracing::debug!(round = rounds, tool_calls = calls.len(), "dispatching tool calls");
        working.push(call_turn);

        let results = match dispatch_round(state, ctx.conversation, ctx.user_id, &calls, ctx.cancel).await {
            Ok(results) => results,
            Err(DispatchCancelled) => {
                return Err(RoundFailure {
                    failure: TurnFailure::Cancelled,
                    rounds,
                });
            }
        };
        working.push(Turn::user(results));
        working = sanitize(working);

        if rounds >= ceiling {
            tracing::warn!(ceiling, "round ceiling reached");
            return Err(RoundFailure {
                failure: TurnFailure::RoundLimitExceeded { ceiling },
                rounds,
            });
        }
    }
}

/// Keep only the text of a terminal response; an empty result becomes
/// the `(no output)` marker so the stored turn is never empty.
fn final_assistant_turn(blocks: Vec<ContentBlock>) -> Turn {
    let mut kept: Vec<ContentBlock> = blocks
        .into_iter()
        .filter(|b| matches!(b, ContentBlock::Text { text } if !text.trim().is_empty()))
        .collect();
    if kept.is_empty() {
        kept.push(ContentBlock::text(EMPTY_REPLY));
    }
    Turn::assistant(kept)
}

fn no_provider() -> ApiError {
    ApiError {
        class: ErrorClass::Fatal,
        attempts: 0,
        last: pl_domain::Error::Auth("no completion provider configured".into()),
    }
}
