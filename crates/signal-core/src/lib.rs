//! SFU signaling layer for vidcall
//!
//! This crate talks to the Selective Forwarding Unit:
//!
//! - [`SfuAdapter`] owns the signaling transport and the RPC surface (join,
//!   migrate, leave, ICE trickle, set-publisher) and republishes inbound
//!   events and connection-state transitions
//! - [`AuthenticationAdapter`] holds the session credentials and refreshes
//!   them through a join-response provider
//!
//! The transport and RPC service themselves are collaborators described by
//! the [`SignalTransport`] and [`SignalService`] traits.

pub mod auth;
pub mod error;
pub mod messages;
pub mod models;
pub mod sfu_adapter;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use auth::{
    AuthenticationAdapter, CallCredentials, IceServer, JoinCallResponse, JoinResponseProvider, SessionCredentials,
    SfuServer,
};
pub use error::{SignalError, SignalResult};
pub use messages::{PerformanceStats, SendStatsRequest, SfuError, SfuEvent, SignalRequest};
pub use models::{
    CallSettings, CameraPosition, ClientDetails, ConnectionState, IceCandidate, OwnCapability, PeerConnectionType,
    PeerType, ReconnectionStrategy, SdpType, SessionDescription, TrackInfo, TrackType,
};
pub use sfu_adapter::{SfuAdapter, SfuAdapterConfig};
pub use transport::{SignalService, SignalServiceFactory, SignalTransport, SignalTransportFactory};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::auth::{AuthenticationAdapter, JoinCallResponse, JoinResponseProvider};
    pub use crate::error::{SignalError, SignalResult};
    pub use crate::messages::SfuEvent;
    pub use crate::models::{ConnectionState, IceCandidate, PeerConnectionType, SessionDescription, TrackType};
    pub use crate::sfu_adapter::{SfuAdapter, SfuAdapterConfig};
    pub use crate::transport::{SignalService, SignalTransport};
}
