//! Content governor: size limits applied to a history.
//!
//! [`govern`] applies, in this order:
//! 1. stale media replacement (images / documents outside the most recent
//!    turns become placeholder text),
//! 2. per-block byte truncation with an omitted-byte marker,
//! 3. oldest-first eviction down to the turn cap, in pairs.
//!
//! Outbound splitting for the transport is separate: [`split_outbound`].

use pl_domain::config::{EngineConfig, LimitsConfig};
use pl_domain::tool::{ContentBlock, ToolResultContent, Turn};
use pl_domain::trace::TraceEvent;

pub const IMAGE_PLACEHOLDER: &str = "[image was here]";
pub const DOCUMENT_PLACEHOLDER: &str = "[document was here]";

const MARKER_PREFIX: &str = "\n\n[truncated: ";
const MARKER_SUFFIX: &str = " bytes omitted]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorLimits {
    pub max_block_bytes: usize,
    pub max_tool_result_bytes: usize,
    pub media_retention_turns: usize,
    pub max_turns: usize,
}

impl GovernorLimits {
    pub fn from_config(limits: &LimitsConfig, engine: &EngineConfig) -> Self {
        Self {
            max_block_bytes: limits.max_block_bytes,
            max_tool_result_bytes: limits.max_tool_result_bytes,
            media_retention_turns: limits.image_retention_turns,
            max_turns: engine.max_turns(),
        }
    }
}

impl Default for GovernorLimits {
    fn default() -> Self {
        Self::from_config(&LimitsConfig::default(), &EngineConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GovernReport {
    pub media_stripped: usize,
    pub blocks_truncated: usize,
    pub turns_evicted: usize,
}

impl GovernReport {
    pub fn changed(&self) -> bool {
        self.media_stripped + self.blocks_truncated + self.turns_evicted > 0
    }
}

/// Apply media stripping, truncation and eviction to `turns` in place.
pub fn govern(turns: &mut Vec<Turn>, limits: &GovernorLimits) -> GovernReport {
    let report = GovernReport {
        media_stripped: strip_stale_media(turns, limits.media_retention_turns),
        blocks_truncated: truncate_blocks(turns, limits),
        turns_evicted: evict_oldest(turns, limits.max_turns),
    };
    if report.changed() {
        tracing::debug!(
            media_stripped = report.media_stripped,
            blocks_truncated = report.blocks_truncated,
            turns_evicted = report.turns_evicted,
            "history governed"
        );
        TraceEvent::HistoryGoverned {
            media_stripped: report.media_stripped,
            blocks_truncated: report.blocks_truncated,
            turns_evicted: report.turns_evicted,
        }
        .emit();
    }
    report
}

// ── 1. Stale media ─────────────────────────────────────────────────

/// Replace images and documents in every turn older than the most recent
/// `keep_turns` with placeholder text. Returns the number replaced.
pub fn strip_stale_media(turns: &mut [Turn], keep_turns: usize) -> usize {
    let cutoff = turns.len().saturating_sub(keep_turns);
    turns[..cutoff]
        .iter_mut()
        .map(|t| strip_media_blocks(&mut t.content))
        .sum()
}

fn strip_media_blocks(blocks: &mut [ContentBlock]) -> usize {
    let mut stripped = 0;
    for block in blocks.iter_mut() {
        match block {
            ContentBlock::Image { .. } => {
                *block = ContentBlock::text(IMAGE_PLACEHOLDER);
                stripped += 1;
            }
            ContentBlock::Document { .. } => {
                *block = ContentBlock::text(DOCUMENT_PLACEHOLDER);
                stripped += 1;
            }
            ContentBlock::ToolResult {
                content: ToolResultContent::Blocks(inner),
                ..
            } => stripped += strip_media_blocks(inner),
            _ => {}
        }
    }
    stripped
}

// ── 2. Truncation ──────────────────────────────────────────────────

fn truncate_blocks(turns: &mut [Turn], limits: &GovernorLimits) -> usize {
    let mut truncated = 0;
    for turn in turns.iter_mut() {
        for block in turn.content.iter_mut() {
            match block {
                ContentBlock::Text { text } => {
                    truncated += usize::from(truncate_in_place(text, limits.max_block_bytes));
                }
                ContentBlock::ToolResult { content, .. } => match content {
                    ToolResultContent::Text(text) => {
                        truncated +=
                            usize::from(truncate_in_place(text, limits.max_tool_result_bytes));
                    }
                    ToolResultContent::Blocks(inner) => {
                        for b in inner.iter_mut() {
                            if let ContentBlock::Text { text } = b {
                                truncated += usize::from(truncate_in_place(
                                    text,
                                    limits.max_tool_result_bytes,
                                ));
                            }
                        }
                    }
                },
                _ => {}
            }
        }
    }
    truncated
}

fn truncate_in_place(text: &mut String, max_bytes: usize) -> bool {
    match truncate_block_text(text, max_bytes) {
        Some(cut) => {
            *text = cut;
            true
        }
        None => false,
    }
}

/// Truncate `text` to at most `max_bytes` bytes (on a char boundary) and
/// append `\n\n[truncated: N bytes omitted]`.
///
/// Returns `None` when no truncation is needed: the text fits, or it is
/// already the output of an earlier truncation at this ceiling.
pub fn truncate_block_text(text: &str, max_bytes: usize) -> Option<String> {
    if text.len() <= max_bytes || is_truncated(text, max_bytes) {
        return None;
    }
    let boundary = floor_char_boundary(text, max_bytes);
    let omitted = text.len() - boundary;
    let mut out = String::with_capacity(boundary + MARKER_PREFIX.len() + MARKER_SUFFIX.len() + 20);
    out.push_str(&text[..boundary]);
    out.push_str(MARKER_PREFIX);
    out.push_str(&omitted.to_string());
    out.push_str(MARKER_SUFFIX);
    Some(out)
}

/// Whether `text` is a kept prefix of at most `max_bytes` plus a marker.
fn is_truncated(text: &str, max_bytes: usize) -> bool {
    let Some(body) = text.strip_suffix(MARKER_SUFFIX) else {
        return false;
    };
    let Some(pos) = body.rfind(MARKER_PREFIX) else {
        return false;
    };
    let count = &body[pos + MARKER_PREFIX.len()..];
    // The count must parse, which bounds the marker to the 20 digits of a usize.
    pos <= max_bytes && count.bytes().all(|b| b.is_ascii_digit()) && count.parse::<usize>().is_ok()
}

/// Largest char boundary `<= index`.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

// ── 3. Eviction ────────────────────────────────────────────────────

/// Drop the oldest turns until at most `max_turns` remain.
///
/// The drop count is rounded up to an even number so a well-formed
/// history still starts with `user`. If the new first turn is a
/// `tool_result` turn its `tool_use` partner was evicted, so the cut
/// moves forward by another pair until it lands on a plain user turn.
pub fn evict_oldest(turns: &mut Vec<Turn>, max_turns: usize) -> usize {
    if turns.len() <= max_turns {
        return 0;
    }
    let mut cut = turns.len() - max_turns;
    cut += cut % 2;
    while cut < turns.len() && turns[cut].has_tool_result() {
        cut += 2;
    }
    let cut = cut.min(turns.len());
    turns.drain(..cut);
    cut
}

// ── 4. Outbound split ──────────────────────────────────────────────

/// Split `text` into transport messages of at most `max_chars` chars.
///
/// Each chunk ends at the last newline inside the limit (the newline is
/// consumed); with no usable newline the chunk is cut hard at the limit.
pub fn split_outbound(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while let Some((limit_byte, _)) = rest.char_indices().nth(max_chars) {
        let window = &rest[..limit_byte];
        match window.rfind('\n') {
            Some(pos) if pos > 0 => {
                chunks.push(window[..pos].to_string());
                rest = &rest[pos + 1..];
            }
            _ => {
                chunks.push(window.to_string());
                rest = &rest[limit_byte..];
            }
        }
    }
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}
