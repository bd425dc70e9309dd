//! Error types for the log domain.

use thiserror::Error;

/// Errors that can occur while producing or consuming logs.
#[derive(Debug, Error)]
pub enum LogError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A severity string could not be interpreted.
    #[error("unknown log level: {0}")]
    UnknownLevel(String),

    /// A query could not be served in full.
    ///
    /// Deliberately opaque: a query either returns a complete, correctly
    /// counted result set or this single failure.
    #[error("failed to read logs")]
    ReadFailed,
}

/// Result type alias for log operations.
pub type Result<T> = std::result::Result<T, LogError>;
