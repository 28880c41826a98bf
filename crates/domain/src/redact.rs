//! Credential scrubbing for text that leaves the process boundary
//! (tool error strings, audit details).

use regex::Regex;
use std::sync::LazyLock;

const REDACTED: &str = "[redacted]";

/// GitHub tokens, Anthropic / OpenAI style keys and bearer headers.
static SECRET_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(ghp_[A-Za-z0-9]{20,}|gho_[A-Za-z0-9]{20,}|github_pat_[A-Za-z0-9_]{20,}|sk-ant-[A-Za-z0-9_\-]{10,}|sk-[A-Za-z0-9]{20,}|(?i:bearer)\s+[A-Za-z0-9._\-]{16,})",
    )
    .ok()
});

/// Replace anything that looks like a credential with `[redacted]`.
///
/// Fails closed: if the pattern cannot be built the whole input is
/// replaced.
pub fn redact_secrets(text: &str) -> String {
    match SECRET_PATTERN.as_ref() {
        Some(re) => re.replace_all(text, REDACTED).into_owned(),
        None => REDACTED.to_string(),
    }
}

/// First `max_chars` characters of `text`, with `...` when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().nth(max_chars).is_some() {
        out.push_str("...");
    }
    out
}
