//! Error types for the adaptive mock platform.

use thiserror::Error;

/// Result type alias for platform operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for platform operations
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing or malformed environment)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error (load/persist failures)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Upstream forwarding error
    #[error("Upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input (admin surface)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Timeout
    #[error("Timeout")]
    Timeout,
}

impl Error {
    /// HTTP status code this error maps to on the admin surface
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidInput(_) | Error::Json(_) => 400,
            Error::NotFound(_) => 404,
            Error::Config(_) => 503,
            Error::Timeout => 504,
            _ => 500,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Storage(_) => "storage",
            Error::Upstream(_) => "upstream",
            Error::Json(_) => "json",
            Error::Io(_) => "io",
            Error::InvalidInput(_) => "invalid_input",
            Error::NotFound(_) => "not_found",
            Error::Internal(_) => "internal",
            Error::Timeout => "timeout",
        }
    }
}
