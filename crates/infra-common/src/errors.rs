//! Error types for the infrastructure layer

use thiserror::Error;

/// Result type for infrastructure operations
pub type InfraResult<T> = Result<T, InfraError>;

/// Errors raised by the shared infrastructure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InfraError {
    /// Configuration could not be parsed or is inconsistent
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// An operation lost the race against its timer
    #[error("Operation '{operation}' timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// An operation was cancelled before completing
    #[error("Operation '{operation}' was cancelled")]
    Cancelled { operation: String },

    /// The logging subsystem could not be installed
    #[error("Logging error: {message}")]
    Logging { message: String },
}

impl InfraError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a logging error
    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
