//! Anthropic-native adapter.
//!
//! Implements the non-streaming Messages API including tool use. The
//! system prompt travels in the top-level `system` field; tool results
//! are user messages carrying `tool_result` blocks.

use crate::traits::{CompletionRequest, CompletionResponse, LlmProvider, StopReason, Usage};
use crate::util::{from_reqwest, resolve_api_key};
use pl_domain::config::LlmConfig;
use pl_domain::error::{Error, Result};
use pl_domain::tool::{ContentBlock, ToolDefinition, ToolResultContent, Turn};
use serde_json::Value;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Error bodies are echoed into logs; keep them short.
const MAX_ERROR_BODY_CHARS: usize = 500;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM provider adapter for the Anthropic Messages API.
pub struct AnthropicProvider {
    id: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Build the provider from config. Fails with [`Error::Auth`] when the
    /// API key environment variable is unset.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.api_key_env)?;

        // The completion client applies its own per-attempt timeout; this
        // one only guards against a wedged connection outliving it.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms.saturating_add(5_000)))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.provider_id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
    }
}

pub(crate) fn build_messages_body(req: &CompletionRequest) -> Value {
    let messages: Vec<Value> = req.turns.iter().map(turn_to_anthropic).collect();

    let mut body = serde_json::json!({
        "model": req.model,
        "messages": messages,
        "max_tokens": req.max_tokens,
    });

    if let Some(system) = req.system.as_deref().filter(|s| !s.is_empty()) {
        body["system"] = Value::String(system.to_string());
    }

    if !req.tools.is_empty() {
        let tools: Vec<Value> = req.tools.iter().map(tool_to_anthropic).collect();
        body["tools"] = Value::Array(tools);
    }

    body
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn turn_to_anthropic(turn: &Turn) -> Value {
    let content: Vec<Value> = turn.content.iter().map(block_to_anthropic).collect();
    serde_json::json!({
        "role": turn.role.as_str(),
        "content": content,
    })
}

fn block_to_anthropic(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => serde_json::json!({
            "type": "text",
            "text": text,
        }),
        ContentBlock::Image { media_type, data } => serde_json::json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": media_type,
                "data": data,
            }
        }),
        ContentBlock::Document { media_type, data } => serde_json::json!({
            "type": "document",
            "source": {
                "type": "base64",
                "media_type": media_type,
                "data": data,
            }
        }),
        ContentBlock::ToolUse { id, name, input } => serde_json::json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            let content = match content {
                ToolResultContent::Text(t) => Value::String(t.clone()),
                ToolResultContent::Blocks(blocks) => {
                    Value::Array(blocks.iter().map(block_to_anthropic).collect())
                }
            };
            serde_json::json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": content,
                "is_error": is_error,
            })
        }
    }
}

fn tool_to_anthropic(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn parse_anthropic_response(body: &Value) -> Result<CompletionResponse> {
    let content_arr = body
        .get("content")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::Other("anthropic response missing content array".into()))?;

    let mut blocks: Vec<ContentBlock> = Vec::new();
    for block in content_arr {
        let block_type = block.get("type").and_then(|v| v.as_str()).unwrap_or("");
        match block_type {
            "text" => {
                if let Some(t) = block.get("text").and_then(|v| v.as_str()) {
                    blocks.push(ContentBlock::text(t));
                }
            }
            "tool_use" => {
                let id = block.get("id").and_then(|v| v.as_str()).unwrap_or("");
                let name = block.get("name").and_then(|v| v.as_str()).unwrap_or("");
                if id.is_empty() || name.is_empty() {
                    tracing::warn!("dropping tool_use block without id or name");
                    continue;
                }
                let input = block
                    .get("input")
                    .cloned()
                    .unwrap_or(Value::Object(Default::default()));
                blocks.push(ContentBlock::tool_use(id, name, input));
            }
            // thinking, redacted_thinking, server tool blocks: not replayed.
            other => {
                tracing::debug!(block_type = %other, "ignoring response block");
            }
        }
    }

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let stop_reason = body
        .get("stop_reason")
        .and_then(|v| v.as_str())
        .map(StopReason::parse)
        .unwrap_or_else(|| StopReason::Other("unknown".into()));

    let usage = body.get("usage").and_then(parse_anthropic_usage);

    Ok(CompletionResponse {
        blocks,
        stop_reason,
        usage,
        model,
    })
}

fn parse_anthropic_usage(v: &Value) -> Option<Usage> {
    let input = v.get("input_tokens")?.as_u64()? as u32;
    let output = v.get("output_tokens")?.as_u64()? as u32;
    Some(Usage {
        input_tokens: input,
        output_tokens: output,
    })
}

/// Turn a non-2xx response into [`Error::Provider`], keeping the status
/// and the API's own error type for classification.
pub(crate) fn parse_anthropic_error(provider: &str, status: u16, body: &str) -> Error {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error_obj = parsed.as_ref().and_then(|v| v.get("error"));
    let kind = error_obj
        .and_then(|e| e.get("type"))
        .and_then(|t| t.as_str())
        .map(String::from);
    let message = error_obj
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(String::from)
        .unwrap_or_else(|| body.chars().take(MAX_ERROR_BODY_CHARS).collect());

    Error::Provider {
        provider: provider.to_string(),
        status: Some(status),
        kind,
        message: format!("HTTP {status} - {message}"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LlmProvider implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = build_messages_body(req);

        tracing::debug!(
            provider = %self.id,
            model = %req.model,
            turns = req.turns.len(),
            tools = req.tools.len(),
            "anthropic messages request"
        );

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(parse_anthropic_error(&self.id, status.as_u16(), &resp_text));
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_anthropic_response(&resp_json)
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_carries_system_tools_and_blocks() {
        let req = CompletionRequest {
            model: "claude-test".into(),
            system: Some("be brief".into()),
            turns: vec![
                Turn::user(vec![
                    ContentBlock::text("what is this?"),
                    ContentBlock::Image {
                        media_type: "image/png".into(),
                        data: "aGVsbG8=".into(),
                    },
                ]),
                Turn::assistant(vec![ContentBlock::tool_use("tu_1", "lookup", json!({"q": "x"}))]),
                Turn::user(vec![ContentBlock::tool_result("tu_1", "found", false)]),
            ],
            tools: vec![ToolDefinition {
                name: "lookup".into(),
                description: "look things up".into(),
                parameters: json!({"type": "object"}),
            }],
            max_tokens: 1024,
        };
        let body = build_messages_body(&req);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["content"][1]["source"]["type"], "base64");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "tu_1");
    }

    #[test]
    fn body_omits_empty_tools() {
        let req = CompletionRequest {
            model: "claude-test".into(),
            system: None,
            turns: vec![Turn::user_text("hi")],
            tools: vec![],
            max_tokens: 16,
        };
        let body = build_messages_body(&req);
        assert!(body.get("tools").is_none());
        assert!(body.get("system").is_none());
    }

    #[test]
    fn parse_tool_use_response() {
        let body = json!({
            "model": "claude-test",
            "stop_reason": "tool_use",
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "tu_7", "name": "list_issues", "input": {"state": "open"}}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 5}
        });
        let resp = parse_anthropic_response(&body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.blocks.len(), 2);
        assert!(resp.has_tool_use());
        assert_eq!(resp.usage, Some(Usage { input_tokens: 12, output_tokens: 5 }));
    }

    #[test]
    fn parse_unknown_stop_reason() {
        let body = json!({"model": "m", "stop_reason": "refusal", "content": []});
        let resp = parse_anthropic_response(&body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::Other("refusal".into()));
    }

    #[test]
    fn parse_missing_content_is_error() {
        assert!(parse_anthropic_response(&json!({"model": "m"})).is_err());
    }

    #[test]
    fn error_body_keeps_status_and_type() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        match parse_anthropic_error("anthropic", 529, body) {
            Error::Provider { status, kind, message, .. } => {
                assert_eq!(status, Some(529));
                assert_eq!(kind.as_deref(), Some("overloaded_error"));
                assert!(message.contains("Overloaded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_json_error_body_is_kept_raw() {
        match parse_anthropic_error("anthropic", 502, "<html>bad gateway</html>") {
            Error::Provider { kind, message, .. } => {
                assert!(kind.is_none());
                assert!(message.contains("bad gateway"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
