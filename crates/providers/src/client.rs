//! Completion client: per-attempt timeout plus classified retry.

use crate::retry::{classify, ErrorClass, RetryPolicy};
use crate::traits::{CompletionRequest, CompletionResponse, LlmProvider};
use pl_domain::config::LlmConfig;
use pl_domain::error::Error;
use pl_domain::trace::TraceEvent;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Final failure of a completion after retries were exhausted, or on
/// the first fatal error.
#[derive(thiserror::Error, Debug)]
#[error("completion failed after {attempts} attempt(s) ({class}): {last}")]
pub struct ApiError {
    pub class: ErrorClass,
    pub attempts: u32,
    #[source]
    pub last: Error,
}

/// Wraps an [`LlmProvider`] with the retry state machine.
///
/// Each attempt is bounded by `attempt_timeout`; an expired attempt is
/// classified as a transient timeout. The attempt index is explicit so
/// tests can script N failures followed by a success.
#[derive(Clone)]
pub struct CompletionClient {
    provider: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl CompletionClient {
    pub fn new(provider: Arc<dyn LlmProvider>, policy: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            provider,
            policy,
            attempt_timeout,
        }
    }

    pub fn from_config(provider: Arc<dyn LlmProvider>, cfg: &LlmConfig) -> Self {
        Self::new(
            provider,
            RetryPolicy::from_config(&cfg.retry),
            Duration::from_millis(cfg.request_timeout_ms),
        )
    }

    pub fn provider_id(&self) -> &str {
        self.provider.provider_id()
    }

    pub async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResponse, ApiError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            let outcome = match tokio::time::timeout(self.attempt_timeout, self.provider.complete(req)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(format!(
                    "completion attempt exceeded {}ms",
                    self.attempt_timeout.as_millis()
                ))),
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(resp) => {
                    TraceEvent::CompletionAttempt {
                        provider: self.provider_id().to_string(),
                        model: resp.model.clone(),
                        attempt,
                        duration_ms,
                        stop_reason: Some(resp.stop_reason.as_str().to_string()),
                        input_tokens: resp.usage.map(|u| u.input_tokens),
                        output_tokens: resp.usage.map(|u| u.output_tokens),
                    }
                    .emit();
                    return Ok(resp);
                }
                Err(e) => {
                    let class = classify(&e);
                    TraceEvent::CompletionAttempt {
                        provider: self.provider_id().to_string(),
                        model: req.model.clone(),
                        attempt,
                        duration_ms,
                        stop_reason: None,
                        input_tokens: None,
                        output_tokens: None,
                    }
                    .emit();

                    if !class.is_transient() || !self.policy.allows_another(attempt) {
                        tracing::warn!(
                            provider = %self.provider_id(),
                            attempt,
                            class = %class,
                            error = %e,
                            "completion failed"
                        );
                        return Err(ApiError {
                            class,
                            attempts: attempt,
                            last: e,
                        });
                    }

                    let delay = self.policy.delay_after_attempt(attempt);
                    tracing::warn!(
                        provider = %self.provider_id(),
                        attempt,
                        class = %class,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient completion failure, retrying"
                    );
                    TraceEvent::CompletionRetry {
                        provider: self.provider_id().to_string(),
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        reason: class.to_string(),
                    }
                    .emit();
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
