//! Call lifecycle for vidcall
//!
//! A [`CallStateMachine`] governs the accept, reject and join handshake of
//! one call through a fixed table of legal stage transitions. Joining can
//! only be reached from idle or accepted, so an inbound call cannot be
//! joined before it was accepted.

pub mod config;
pub mod error;
pub mod machine;
pub mod stage;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{JoinInput, JoinRetryPolicy};
pub use error::{CallError, CallResult};
pub use machine::{CallActions, CallStateMachine, StageOutcome};
pub use stage::{AcceptCallResponse, CallStage, RejectCallResponse, StageId, StageTransition};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::config::JoinInput;
    pub use crate::error::{CallError, CallResult};
    pub use crate::machine::{CallActions, CallStateMachine};
    pub use crate::stage::{CallStage, StageId};
}
