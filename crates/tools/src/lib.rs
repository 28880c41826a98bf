//! Tool dispatch for parley.
//!
//! Capabilities are registered by name at startup; the dispatcher looks
//! them up per call and turns every failure (unknown name, handler error,
//! panic, timeout) into an error result instead of an `Err`.

pub mod clock;
pub mod registry;

pub use clock::CurrentTimeTool;
pub use registry::{FnTool, ToolHandler, ToolRegistry, ToolResult};
