use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Content limits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Byte ceiling for a single text block.
    #[serde(default = "d_max_block_bytes")]
    pub max_block_bytes: usize,
    /// Byte ceiling for a single tool result.
    #[serde(default = "d_max_tool_result_bytes")]
    pub max_tool_result_bytes: usize,
    /// Images and documents survive only in the most recent N turns.
    #[serde(default = "d_image_retention_turns")]
    pub image_retention_turns: usize,
    /// Hard length limit of one outbound transport message, in chars.
    #[serde(default = "d_outbound_split_chars")]
    pub outbound_split_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_block_bytes: d_max_block_bytes(),
            max_tool_result_bytes: d_max_tool_result_bytes(),
            image_retention_turns: d_image_retention_turns(),
            outbound_split_chars: d_outbound_split_chars(),
        }
    }
}

fn d_max_block_bytes() -> usize {
    20_000
}
fn d_max_tool_result_bytes() -> usize {
    10_000
}
fn d_image_retention_turns() -> usize {
    10
}
fn d_outbound_split_chars() -> usize {
    4096
}
