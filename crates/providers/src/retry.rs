//! Error classification and jittered exponential back-off.

use pl_domain::config::RetryConfig;
use pl_domain::error::Error;
use std::fmt;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    RateLimited,
    Overloaded,
    Timeout,
    Network,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient(TransientKind),
    Fatal,
}

impl ErrorClass {
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorClass::Transient(_))
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::Transient(TransientKind::RateLimited) => "rate_limited",
            ErrorClass::Transient(TransientKind::Overloaded) => "overloaded",
            ErrorClass::Transient(TransientKind::Timeout) => "timeout",
            ErrorClass::Transient(TransientKind::Network) => "network",
            ErrorClass::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Decide whether a failed completion attempt is worth repeating.
///
/// Provider-reported error types win over the bare status code, so a
/// `400 invalid_request_error` stays fatal while `529 overloaded_error`
/// is retried.
pub fn classify(err: &Error) -> ErrorClass {
    match err {
        Error::Timeout(_) => ErrorClass::Transient(TransientKind::Timeout),
        Error::Http(_) => ErrorClass::Transient(TransientKind::Network),
        Error::Provider { status, kind, .. } => {
            match kind.as_deref() {
                Some("rate_limit_error") => {
                    return ErrorClass::Transient(TransientKind::RateLimited)
                }
                Some("overloaded_error") | Some("api_error") => {
                    return ErrorClass::Transient(TransientKind::Overloaded)
                }
                _ => {}
            }
            match status {
                Some(429) => ErrorClass::Transient(TransientKind::RateLimited),
                Some(500 | 502 | 503 | 504 | 529) => {
                    ErrorClass::Transient(TransientKind::Overloaded)
                }
                _ => ErrorClass::Fatal,
            }
        }
        _ => ErrorClass::Fatal,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Back-off policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each one.
    pub base_delay: Duration,
    /// Cap applied before jitter.
    pub max_delay: Duration,
    /// Mixed into the jitter so concurrent clients spread out.
    pub jitter_seed: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        let seed = uuid::Uuid::new_v4().as_bytes()[0] as u32;
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            jitter_seed: seed,
        }
    }

    /// A policy that retries without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_seed: 0,
        }
    }

    /// Delay to wait after the given failed attempt (1-indexed).
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base_ms = self.base_delay.as_millis() as f64;
        let delay_ms = base_ms * 2f64.powi(exp as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        // Up to 25% jitter on top of the capped delay.
        let jitter = capped_ms * 0.25 * pseudo_random_fraction(attempt ^ self.jitter_seed);
        Duration::from_millis((capped_ms + jitter) as u64)
    }

    /// Whether another attempt may follow the given failed attempt.
    pub fn allows_another(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Cheap deterministic fraction in [0, 1).
fn pseudo_random_fraction(n: u32) -> f64 {
    let hash = n.wrapping_mul(2654435761); // Knuth multiplicative hash
    (hash as f64) / (u32::MAX as f64 + 1.0)
}
