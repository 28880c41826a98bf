use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum completion calls per inbound user turn.
    #[serde(default = "d_max_rounds")]
    pub max_rounds: u32,
    /// History cap in exchanges; the stored turn cap is twice this.
    #[serde(default = "d_max_history")]
    pub max_history: usize,
    /// Bound on a single tool handler call.
    #[serde(default = "d_tool_timeout_ms")]
    pub tool_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rounds: d_max_rounds(),
            max_history: d_max_history(),
            tool_timeout_ms: d_tool_timeout_ms(),
        }
    }
}

impl EngineConfig {
    pub fn max_turns(&self) -> usize {
        self.max_history.saturating_mul(2)
    }
}

fn d_max_rounds() -> u32 {
    15
}
fn d_max_history() -> usize {
    50
}
fn d_tool_timeout_ms() -> u64 {
    60_000
}
