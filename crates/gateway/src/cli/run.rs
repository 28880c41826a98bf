//! `parley run`: one-shot execution command.
//!
//! Sends a single message, prints the reply and exits. Useful for
//! scripting and piping.

use std::sync::Arc;

use pl_domain::config::Config;
use pl_domain::tool::ContentBlock;

use crate::bootstrap;
use crate::runtime::{submit_turn, TurnInput};

/// Execute a single turn and print the reply.
///
/// Returns `false` when the turn failed; the failure's user message has
/// already been printed.
pub async fn run(
    config: Arc<Config>,
    message: String,
    conversation: String,
    model: Option<String>,
    json_output: bool,
) -> anyhow::Result<bool> {
    let state = bootstrap::build_app_state(config)?;
    bootstrap::require_provider(&state)?;

    let input = TurnInput {
        conversation_key: conversation.clone(),
        content: vec![ContentBlock::text(message)],
        user_id: None,
        model,
    };

    match submit_turn(&state, input).await {
        Ok(reply) => {
            if json_output {
                let out = serde_json::json!({
                    "conversation": conversation,
                    "reply": reply.text,
                    "rounds": reply.rounds,
                    "history_len": reply.history_len,
                    "usage": {
                        "input_tokens": reply.usage.input_tokens,
                        "output_tokens": reply.usage.output_tokens,
                    },
                });
                let json = serde_json::to_string_pretty(&out)
                    .map_err(|e| anyhow::anyhow!("serializing reply: {e}"))?;
                println!("{json}");
            } else {
                for chunk in &reply.chunks {
                    println!("{chunk}");
                }
            }
            Ok(true)
        }
        Err(failure) => {
            tracing::debug!(error = %failure, "turn failed");
            if json_output {
                let out = serde_json::json!({
                    "conversation": conversation,
                    "error": failure.user_message(),
                });
                println!("{out}");
            } else {
                eprintln!("error: {}", failure.user_message());
            }
            Ok(false)
        }
    }
}
