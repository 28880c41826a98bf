//! Tool registry: maps tool names to handlers and isolates their failures.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde_json::Value;

use pl_domain::redact::{preview, redact_secrets};
use pl_domain::tool::{ContentBlock, ToolDefinition};

/// Error text handed back to the model is capped at this many chars.
const MAX_ERROR_CHARS: usize = 500;

/// Implement this trait to expose a capability to the model.
///
/// Handlers receive the raw JSON input the model produced and return
/// either a result string (usually JSON) or an error description.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + 'static {
    async fn call(&self, input: Value) -> Result<String, String>;
}

/// Adapter so plain async closures can be registered as handlers.
pub struct FnTool<F>(pub F);

#[async_trait::async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, String>> + Send + 'static,
{
    async fn call(&self, input: Value) -> Result<String, String> {
        (self.0)(input).await
    }
}

/// Outcome of one dispatch. Never an `Err`: failures are data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub text: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    /// An error result with credentials scrubbed and length capped.
    pub fn error(text: impl AsRef<str>) -> Self {
        Self {
            text: preview(&redact_secrets(text.as_ref()), MAX_ERROR_CHARS),
            is_error: true,
        }
    }

    /// The `tool_result` block answering invocation `call_id`.
    pub fn into_block(self, call_id: &str) -> ContentBlock {
        ContentBlock::tool_result(call_id, self.text, self.is_error)
    }
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Registry of tool handlers, populated at startup.
///
/// An integration that failed to initialise is simply never registered;
/// the model then never sees it, and a hallucinated call to it resolves
/// as "unknown tool".
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<RegisteredTool>>,
    /// Registration order, for stable definition lists.
    order: Vec<String>,
    call_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
            call_timeout,
        }
    }

    /// Register a handler under `definition.name`. A second registration
    /// with the same name replaces the first.
    pub fn register(&mut self, definition: ToolDefinition, handler: Arc<dyn ToolHandler>) -> &mut Self {
        let name = definition.name.clone();
        if self.tools.contains_key(&name) {
            tracing::warn!(tool = %name, "tool registered twice, replacing");
        } else {
            self.order.push(name.clone());
        }
        self.tools
            .insert(name, Arc::new(RegisteredTool { definition, handler }));
        self
    }

    /// Register an async closure.
    pub fn register_fn<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        f: F,
    ) -> &mut Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        let definition = ToolDefinition {
            name: name.into(),
            description: description.into(),
            parameters,
        };
        self.register(definition, Arc::new(FnTool(f)))
    }

    /// Remove a tool, e.g. one disabled by config.
    pub fn unregister(&mut self, name: &str) -> bool {
        let removed = self.tools.remove(name).is_some();
        if removed {
            self.order.retain(|n| n != name);
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions offered to the model, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| t.definition.clone())
            .collect()
    }

    /// Invoke the named tool. Unknown names, handler errors, panics and
    /// timeouts all come back as `is_error` results.
    pub async fn dispatch(&self, name: &str, input: Value) -> ToolResult {
        let Some(tool) = self.tools.get(name).cloned() else {
            tracing::warn!(tool = %name, "unknown tool requested");
            return ToolResult::error("unknown tool");
        };

        let started = Instant::now();
        let call = AssertUnwindSafe(tool.handler.call(input)).catch_unwind();
        let result = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(Ok(text))) => ToolResult::success(text),
            Ok(Ok(Err(message))) => ToolResult::error(message),
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(tool = %name, panic = %message, "tool handler panicked");
                ToolResult::error(format!("tool '{name}' failed internally: {message}"))
            }
            Err(_) => {
                tracing::warn!(
                    tool = %name,
                    timeout_ms = self.call_timeout.as_millis() as u64,
                    "tool call timed out"
                );
                ToolResult::error(format!(
                    "tool '{name}' timed out after {}ms",
                    self.call_timeout.as_millis()
                ))
            }
        };

        tracing::debug!(
            tool = %name,
            is_error = result.is_error,
            duration_ms = started.elapsed().as_millis() as u64,
            "tool dispatched"
        );
        result
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
