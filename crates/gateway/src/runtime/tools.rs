//! Tool dispatch for one round.
//!
//! Calls are awaited one at a time in the order the assistant requested
//! them, so the resulting `tool_result` turn is reproducible regardless
//! of how fast each handler is.

use std::time::Instant;

use tracing::Instrument;

use pl_domain::redact::preview;
use pl_domain::tool::{ContentBlock, ToolCall};
use pl_domain::trace::TraceEvent;
use pl_sessions::AuditEntry;

use crate::state::AppState;

use super::cancel::CancelToken;

/// Max chars of tool input recorded in the audit log.
const AUDIT_INPUT_PREVIEW: usize = 200;

/// Raised when cancellation is observed between two tool calls.
#[derive(Debug)]
pub(super) struct DispatchCancelled;

/// Dispatch every call in order and return one `tool_result` block per
/// call, in the same order.
pub(super) async fn dispatch_round(
    state: &AppState,
    conversation: &str,
    user_id: Option<&str>,
    calls: &[ToolCall],
    cancel: &CancelToken,
) -> Result<Vec<ContentBlock>, DispatchCancelled> {
    let mut blocks = Vec::with_capacity(calls.len());

    for call in calls {
        if cancel.is_cancelled() {
            tracing::info!(tool = %call.tool_name, "cancelled before tool dispatch");
            return Err(DispatchCancelled);
        }

        let mut entry = AuditEntry::new(
            "tool_call",
            conversation,
            format!(
                "{}: {}",
                call.tool_name,
                preview(&call.arguments.to_string(), AUDIT_INPUT_PREVIEW)
            ),
        );
        if let Some(uid) = user_id {
            entry = entry.with_user(uid);
        }
        state.audit.append(entry);

        let tool_span = tracing::info_span!(
            "tool.call",
            tool = %call.tool_name,
            call_id = %call.call_id,
        );
        let started = Instant::now();
        let result = state
            .tools
            .dispatch(&call.tool_name, call.arguments.clone())
            .instrument(tool_span)
            .await;

        TraceEvent::ToolDispatched {
            conversation: conversation.to_string(),
            tool: call.tool_name.clone(),
            call_id: call.call_id.clone(),
            is_error: result.is_error,
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();

        blocks.push(result.into_block(&call.call_id));
    }

    Ok(blocks)
}
