//! Error types for the audio session layer

use thiserror::Error;
use vidcall_infra_common::InfraError;

use crate::session::{AudioCategory, AudioMode, CategoryOptions};

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;

/// Errors raised by the audio store and its collaborators
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AudioError {
    /// The requested combination is not a legal audio session configuration
    #[error("Invalid audio session configuration category:{category} mode:{mode} options:{options}")]
    InvalidConfiguration {
        category: AudioCategory,
        mode: AudioMode,
        options: CategoryOptions,
    },

    /// The audio hardware rejected a call
    #[error("Audio hardware {operation} failed: {message}")]
    Hardware { operation: String, message: String },

    /// Microphone permission could not be obtained
    #[error("Permission error: {message}")]
    Permission { message: String },

    /// The recorder could not be started
    #[error("Recorder error: {message}")]
    Recorder { message: String },

    /// The store's dispatch loop is gone
    #[error("Audio store is closed")]
    StoreClosed,

    /// Infrastructure error (timeouts, cancellation)
    #[error(transparent)]
    Infra(#[from] InfraError),
}

impl AudioError {
    /// Create an invalid-configuration error
    pub fn invalid_configuration(category: AudioCategory, mode: AudioMode, options: CategoryOptions) -> Self {
        Self::InvalidConfiguration {
            category,
            mode,
            options,
        }
    }

    /// Create a hardware error
    pub fn hardware(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hardware {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a permission error
    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
        }
    }

    /// Create a recorder error
    pub fn recorder(message: impl Into<String>) -> Self {
        Self::Recorder {
            message: message.into(),
        }
    }
}
