use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Built-in tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default IANA timezone for `current_time`.
    #[serde(default = "d_timezone")]
    pub timezone: String,
    /// Tools to leave out of the registry even when available.
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timezone: d_timezone(),
            disabled: Vec::new(),
        }
    }
}

fn d_timezone() -> String {
    "UTC".into()
}
