/// Shared error type used across all parley crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// A response from the completion API that was not a success.
    ///
    /// `status` is the HTTP status when one was received; `kind` is the
    /// provider's own error type string (e.g. `overloaded_error`).
    #[error("provider {provider}: {message}")]
    Provider {
        provider: String,
        status: Option<u16>,
        kind: Option<String>,
        message: String,
    },

    #[error("store: {0}")]
    Store(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
