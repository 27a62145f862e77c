//! Error types for the signaling layer

use thiserror::Error;
use vidcall_infra_common::InfraError;

/// Result type for signaling operations
pub type SignalResult<T> = Result<T, SignalError>;

/// Errors that can occur while talking to the SFU
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SignalError {
    /// The signaling channel is not connected
    #[error("Not connected: {operation} requires a connected signaling channel")]
    NotConnected { operation: String },

    /// The transport failed to deliver or receive
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The SFU answered an RPC with an error payload
    #[error("SFU rejected {operation} (code {code}): {message}")]
    Rpc {
        operation: String,
        code: u32,
        message: String,
    },

    /// A message could not be encoded or decoded
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    /// The server URL returned by authentication is unusable
    #[error("Invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The join-response provider failed
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Infrastructure error (timeouts, cancellation)
    #[error(transparent)]
    Infra(#[from] InfraError),
}

impl SignalError {
    /// Create a not-connected error
    pub fn not_connected(operation: impl Into<String>) -> Self {
        Self::NotConnected {
            operation: operation.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an RPC error
    pub fn rpc(operation: impl Into<String>, code: u32, message: impl Into<String>) -> Self {
        Self::Rpc {
            operation: operation.into(),
            code,
            message: message.into(),
        }
    }

    /// Create an encoding error
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Create an invalid URL error
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Whether retrying the operation may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::NotConnected { .. } | Self::Transport { .. } | Self::Rpc { .. } => true,
            Self::Infra(e) => e.is_recoverable(),
            Self::Encoding { .. } | Self::InvalidUrl { .. } | Self::Authentication { .. } => false,
        }
    }
}
