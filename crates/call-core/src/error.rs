//! Error types for the call lifecycle

use thiserror::Error;
use vidcall_signal_core::SignalError;

use crate::stage::StageId;

/// Result type for call lifecycle operations
pub type CallResult<T> = Result<T, CallError>;

/// Errors raised while accepting, rejecting or joining a call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CallError {
    /// The action executed by a stage failed
    #[error("{stage} failed: {message}")]
    ActionFailed { stage: StageId, message: String },

    /// The call went away before the stage could run
    #[error("Call released before {stage} completed")]
    CallReleased { stage: StageId },

    /// The requested operation was given unusable input
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Signaling error raised by a call action
    #[error(transparent)]
    Signal(#[from] SignalError),
}

impl CallError {
    /// Create an action failure from an embedder error
    pub fn action_failed(stage: StageId, error: &anyhow::Error) -> Self {
        if let Some(signal) = error.downcast_ref::<SignalError>() {
            return Self::Signal(signal.clone());
        }
        Self::ActionFailed {
            stage,
            message: format!("{:#}", error),
        }
    }

    /// Create a released-call error
    pub fn call_released(stage: StageId) -> Self {
        Self::CallReleased { stage }
    }

    /// Create an invalid input error
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput { reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_errors_keep_their_type() {
        let error = anyhow::Error::new(SignalError::not_connected("join"));
        assert_eq!(
            CallError::action_failed(StageId::Joining, &error),
            CallError::Signal(SignalError::not_connected("join"))
        );
    }

    #[test]
    fn test_other_errors_carry_context() {
        let error = anyhow::anyhow!("timed out").context("join call");
        let CallError::ActionFailed { stage, message } = CallError::action_failed(StageId::Joining, &error) else {
            panic!("expected an action failure");
        };
        assert_eq!(stage, StageId::Joining);
        assert_eq!(message, "join call: timed out");
    }
}
