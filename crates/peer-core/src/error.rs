//! Error types for peer connection coordination

use thiserror::Error;
use vidcall_infra_common::InfraError;
use vidcall_signal_core::{OwnCapability, PeerConnectionType, SignalError};

/// Result type for peer connection operations
pub type PeerResult<T> = Result<T, PeerError>;

/// Errors raised by the peer connection layer
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PeerError {
    /// Creating or applying a session description failed
    #[error("Negotiation failed during {operation}: {message}")]
    Negotiation { operation: String, message: String },

    /// The native connection rejected an operation
    #[error("Native peer connection error in {operation}: {message}")]
    Native { operation: String, message: String },

    /// A coordinator cannot be created without signaling
    #[error("No SFU adapter available to set up the {peer_type} connection")]
    MissingSfuAdapter { peer_type: PeerConnectionType },

    /// The operation needs a capability the participant lacks
    #[error("Missing capability: {capability:?}")]
    MissingCapability { capability: OwnCapability },

    /// Capturing or creating a local track failed
    #[error("Track error: {message}")]
    Track { message: String },

    /// The coordinator has been closed
    #[error("The {peer_type} peer connection is closed")]
    Closed { peer_type: PeerConnectionType },

    /// Signaling error
    #[error(transparent)]
    Signal(#[from] SignalError),

    /// Infrastructure error (timeouts, cancellation)
    #[error(transparent)]
    Infra(#[from] InfraError),
}

impl PeerError {
    /// Create a negotiation error
    pub fn negotiation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Negotiation {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a native error
    pub fn native(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Native {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a track error
    pub fn track(message: impl Into<String>) -> Self {
        Self::Track {
            message: message.into(),
        }
    }
}
