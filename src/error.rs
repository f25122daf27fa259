//! SignalMesh error types

use thiserror::Error;

/// SignalMesh error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid or malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Signal pattern error (invalid regex, unknown pattern id, ...)
    #[error("Pattern error: {0}")]
    Pattern(String),

    /// Permission denied for a context operation
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Requested entity does not exist or is no longer available
    #[error("Not found: {0}")]
    NotFound(String),

    /// Delivery error (consumer failure, timeout)
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for SignalMesh operations
pub type Result<T> = std::result::Result<T, Error>;
