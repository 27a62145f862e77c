//! Errors surfaced by a call session

use thiserror::Error;
use vidcall_audio_core::AudioError;
use vidcall_call_core::{CallError, StageId};
use vidcall_infra_common::InfraError;
use vidcall_peer_core::PeerError;
use vidcall_signal_core::SignalError;
use vidcall_stats_core::StatsError;

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised while configuring or driving a [`CallSession`](crate::CallSession)
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    /// The builder lacks a collaborator the session cannot work without
    #[error("Missing component: {component}")]
    MissingComponent { component: &'static str },

    /// Configuration could not be read or parsed
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The call is in a stage that does not allow the request
    #[error("Cannot {operation} while the call is {stage}")]
    InvalidStage { operation: &'static str, stage: StageId },

    /// The session has not joined yet
    #[error("Session is not joined")]
    NotJoined,

    /// The session left its call and cannot be reused
    #[error("Session has left the call")]
    Left,

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Infra(#[from] InfraError),
}

impl SessionError {
    pub fn missing(component: &'static str) -> Self {
        Self::MissingComponent { component }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
