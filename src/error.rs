//! Error types for the hostcall bridge.

use thiserror::Error;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the hostcall bridge.
#[derive(Error, Debug)]
pub enum Error {
    /// Error-kind registry usage errors (duplicate registration).
    #[error("Registry error: {0}")]
    Registry(String),

    /// Wrapper usage errors (bad argument list for a synthesized wrapper).
    #[error("Wrapper error: {op}: {message}")]
    Wrapper { op: String, message: String },

    /// Synchronous host submission failures, propagated to the wrapper caller.
    #[error("Submit error: {op}: {message}")]
    Submit { op: String, message: String },

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] Box<serde_json::Error>),
}

impl Error {
    /// Create a registry error.
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry(message.into())
    }

    /// Create a wrapper usage error.
    pub fn wrapper(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Wrapper {
            op: op.into(),
            message: message.into(),
        }
    }

    /// Create a host submission error.
    pub fn submit(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Submit {
            op: op.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Box::new(value))
    }
}
