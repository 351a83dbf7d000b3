//! Error types for riskflow.
//!
//! Library crates use [`RiskflowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all riskflow operations.
#[derive(Debug, thiserror::Error)]
pub enum RiskflowError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Local precondition failure. No remote call was made.
    #[error("{message}")]
    Validation { message: String },

    /// Transport failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a non-2xx status.
    #[error("{endpoint}: HTTP {status}")]
    Remote {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The backend answered 2xx but the body was not a JSON object.
    #[error("{endpoint}: invalid response body: {message}")]
    Decode { endpoint: String, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// The background worker running a remote call panicked or was aborted.
    #[error("worker task failed: {0}")]
    Worker(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RiskflowError>;

impl RiskflowError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a remote error from an endpoint, status code and response body.
    pub fn remote(endpoint: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Remote {
            endpoint: endpoint.into(),
            status,
            body: body.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Render the error as the text shown in place of a stage result.
    ///
    /// Remote and transport failures are prefixed with `API Error:`; a
    /// non-empty response body is appended on its own line.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { message } => message.clone(),
            Self::Remote { body, .. } if !body.trim().is_empty() => {
                format!("API Error: {self}\nResponse text: {body}")
            }
            Self::Remote { .. } | Self::Network(_) | Self::Decode { .. } => {
                format!("API Error: {self}")
            }
            other => format!("Error: {other}"),
        }
    }
}
