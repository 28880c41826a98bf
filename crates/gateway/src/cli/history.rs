//! Inspection commands: `history`, `reset`, `audit`.
//!
//! None of these need a completion provider.

use std::sync::Arc;

use pl_domain::config::Config;
use pl_domain::tool::{ContentBlock, ToolResultContent, Turn};
use pl_domain::redact::preview;

use crate::bootstrap;
use crate::runtime::{cached_history, clear_conversation};

/// Longest tool payload shown in a transcript line.
const TRANSCRIPT_PREVIEW: usize = 120;

pub async fn history(config: Arc<Config>, conversation: &str, json: bool) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config)?;
    let turns = cached_history(&state, conversation).await?;

    if json {
        let out = serde_json::to_string_pretty(&turns)
            .map_err(|e| anyhow::anyhow!("serializing history: {e}"))?;
        println!("{out}");
        return Ok(());
    }

    if turns.is_empty() {
        eprintln!("(no history for {conversation})");
    }
    for line in transcript(&turns) {
        println!("{line}");
    }
    Ok(())
}

pub async fn reset(config: Arc<Config>, conversation: &str) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config)?;
    clear_conversation(&state, conversation).await?;
    println!("Conversation {conversation} cleared.");
    Ok(())
}

pub fn audit(config: Arc<Config>, conversation: Option<&str>, limit: usize) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config)?;
    if !state.audit.is_enabled() {
        eprintln!("audit log is disabled (store.audit = false)");
        return Ok(());
    }
    for entry in state.audit.recent(limit, conversation) {
        let user = entry.user_id.as_deref().unwrap_or("-");
        println!(
            "{}  {:<22} {:<20} {:<8} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.event,
            entry.conversation,
            user,
            entry.detail
        );
    }
    Ok(())
}

/// One display line per content block.
pub fn transcript(turns: &[Turn]) -> Vec<String> {
    let mut lines = Vec::new();
    for turn in turns {
        let role = turn.role.as_str();
        for block in &turn.content {
            let body = match block {
                ContentBlock::Text { text } => text.clone(),
                ContentBlock::Image { media_type, .. } => format!("[image {media_type}]"),
                ContentBlock::Document { media_type, .. } => format!("[document {media_type}]"),
                ContentBlock::ToolUse { name, input, .. } => {
                    format!("[tool: {name}] {}", preview(&input.to_string(), TRANSCRIPT_PREVIEW))
                }
                ContentBlock::ToolResult {
                    content, is_error, ..
                } => {
                    let text = match content {
                        ToolResultContent::Text(t) => t.clone(),
                        ToolResultContent::Blocks(blocks) => Turn::user(blocks.clone()).text(),
                    };
                    let tag = if *is_error { "tool error" } else { "tool result" };
                    format!("[{tag}] {}", preview(&text, TRANSCRIPT_PREVIEW))
                }
            };
            lines.push(format!("{role}> {body}"));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transcript_renders_every_block() {
        let turns = vec![
            Turn::user_text("list my issues"),
            Turn::assistant(vec![ContentBlock::tool_use("tu_1", "list_issues", json!({"state": "open"}))]),
            Turn::user(vec![ContentBlock::tool_result("tu_1", "[]", false)]),
            Turn::assistant_text("You have no open issues."),
        ];
        let lines = transcript(&turns);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "user> list my issues");
        assert!(lines[1].starts_with("assistant> [tool: list_issues]"));
        assert_eq!(lines[2], "user> [tool result] []");
        assert_eq!(lines[3], "assistant> You have no open issues.");
    }
}
