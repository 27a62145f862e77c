//! Call stages and the table of legal transitions

use std::fmt;

use serde::{Deserialize, Serialize};
use vidcall_signal_core::JoinCallResponse;

use crate::error::CallError;

/// Identity of a call stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Idle,
    Accepting,
    Accepted,
    Rejecting,
    Rejected,
    Joining,
    Joined,
    Error,
}

impl StageId {
    /// Whether a call in `self` may move to `next`
    ///
    /// Joining may be re-entered from joining, which is how join retries
    /// advance.
    pub fn can_transition_to(self, next: StageId) -> bool {
        use StageId::*;

        matches!(
            (self, next),
            (Idle, Accepting)
                | (Accepting, Accepted)
                | (Idle, Rejecting)
                | (Rejecting, Rejected)
                | (Idle | Accepted | Joining, Joining)
                | (Joining, Joined)
                | (Accepting | Rejecting | Joining, Error)
                | (Error, Idle)
        )
    }

    /// Stages that run an action when entered
    pub fn is_executing(self) -> bool {
        matches!(self, Self::Accepting | Self::Rejecting | Self::Joining)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Accepting => "accepting",
            Self::Accepted => "accepted",
            Self::Rejecting => "rejecting",
            Self::Rejected => "rejected",
            Self::Joining => "joining",
            Self::Joined => "joined",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Answer of a successful accept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptCallResponse {
    pub call_cid: String,
}

/// Answer of a successful reject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectCallResponse {
    pub call_cid: String,
    pub reason: Option<String>,
}

/// A call stage with the payload of its phase
#[derive(Debug, Clone, PartialEq)]
pub enum CallStage {
    Idle,
    Accepting,
    Accepted(AcceptCallResponse),
    Rejecting { reason: Option<String> },
    Rejected(RejectCallResponse),
    Joining { attempt: u32 },
    Joined(Box<JoinCallResponse>),
    Error(CallError),
}

impl CallStage {
    pub fn id(&self) -> StageId {
        match self {
            Self::Idle => StageId::Idle,
            Self::Accepting => StageId::Accepting,
            Self::Accepted(_) => StageId::Accepted,
            Self::Rejecting { .. } => StageId::Rejecting,
            Self::Rejected(_) => StageId::Rejected,
            Self::Joining { .. } => StageId::Joining,
            Self::Joined(_) => StageId::Joined,
            Self::Error(_) => StageId::Error,
        }
    }
}

impl fmt::Display for CallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Joining { attempt } if *attempt > 0 => write!(f, "joining (retry {})", attempt),
            other => write!(f, "{}", other.id()),
        }
    }
}

/// One accepted stage change
#[derive(Debug, Clone, PartialEq)]
pub struct StageTransition {
    pub from: StageId,
    pub to: StageId,
}
