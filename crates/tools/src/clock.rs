//! Built-in `current_time` capability.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use pl_domain::tool::ToolDefinition;

use crate::registry::ToolHandler;

pub const CURRENT_TIME: &str = "current_time";

pub struct CurrentTimeTool {
    default_timezone: String,
}

impl CurrentTimeTool {
    pub fn new(default_timezone: impl Into<String>) -> Self {
        Self {
            default_timezone: default_timezone.into(),
        }
    }

    pub fn definition() -> ToolDefinition {
        ToolDefinition {
            name: CURRENT_TIME.into(),
            description: "Get the current date and time. Returns local time, UTC time and \
                          the Unix timestamp for an IANA timezone."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "timezone": {
                        "type": "string",
                        "description": "IANA timezone name (e.g. 'Europe/London'). Defaults to the configured timezone."
                    }
                },
                "required": []
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for CurrentTimeTool {
    async fn call(&self, input: Value) -> Result<String, String> {
        let tz_name = input
            .get("timezone")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.default_timezone);

        let tz: chrono_tz::Tz = tz_name
            .parse()
            .map_err(|_| format!("invalid timezone: {tz_name}"))?;

        let now_utc = Utc::now();
        let now_local = now_utc.with_timezone(&tz);

        Ok(json!({
            "timezone": tz_name,
            "local": now_local.format("%Y-%m-%d %H:%M:%S %Z").to_string(),
            "utc": now_utc.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            "weekday": now_local.format("%A").to_string(),
            "unix": now_utc.timestamp(),
        })
        .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uses_configured_default() {
        let tool = CurrentTimeTool::new("Asia/Tokyo");
        let out = tool.call(json!({})).await.unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["timezone"], "Asia/Tokyo");
        assert!(v["unix"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn explicit_timezone_wins() {
        let tool = CurrentTimeTool::new("UTC");
        let out = tool.call(json!({"timezone": "Europe/London"})).await.unwrap();
        assert!(out.contains("Europe/London"));
    }

    #[tokio::test]
    async fn invalid_timezone_is_error() {
        let tool = CurrentTimeTool::new("UTC");
        let err = tool.call(json!({"timezone": "Not/A/Zone"})).await.unwrap_err();
        assert!(err.contains("invalid timezone"));
    }
}
