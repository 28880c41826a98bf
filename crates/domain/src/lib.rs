pub mod config;
pub mod error;
pub mod redact;
pub mod tool;
pub mod trace;

pub use error::{Error, Result};
