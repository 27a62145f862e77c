//! Error types for the statistics pipeline

use thiserror::Error;
use vidcall_peer_core::PeerError;
use vidcall_signal_core::SignalError;

/// Result type for statistics operations
pub type StatsResult<T> = Result<T, StatsError>;

/// Errors raised while collecting or delivering statistics
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StatsError {
    /// Nothing has been collected yet
    #[error("No statistics report available")]
    NoReport,

    /// Delivery needs an SFU adapter and a session
    #[error("Statistics delivery is not configured: {reason}")]
    NotConfigured { reason: String },

    /// A report could not be serialized
    #[error("Failed to encode {what}: {message}")]
    Encoding { what: String, message: String },

    /// Reading native statistics failed
    #[error(transparent)]
    Peer(#[from] PeerError),

    /// Sending the report failed
    #[error(transparent)]
    Signal(#[from] SignalError),
}

impl StatsError {
    pub fn not_configured(reason: impl Into<String>) -> Self {
        Self::NotConfigured { reason: reason.into() }
    }

    pub fn encoding(what: impl Into<String>, error: &serde_json::Error) -> Self {
        Self::Encoding {
            what: what.into(),
            message: error.to_string(),
        }
    }
}
