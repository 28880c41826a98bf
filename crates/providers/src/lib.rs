pub mod anthropic;
pub mod client;
pub mod retry;
pub mod traits;
pub(crate) mod util;

// Re-exports for convenience.
pub use anthropic::AnthropicProvider;
pub use client::{ApiError, CompletionClient};
pub use retry::{classify, ErrorClass, RetryPolicy, TransientKind};
pub use traits::{CompletionRequest, CompletionResponse, LlmProvider, StopReason, Usage};
