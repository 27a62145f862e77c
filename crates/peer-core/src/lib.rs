//! Peer connection layer for vidcall
//!
//! A call holds two peer connections to the SFU: the *publisher* carries
//! local media upstream and the *subscriber* receives everyone else.
//!
//! - [`PeerConnectionCoordinator`] wraps one native connection, serialises
//!   its negotiation and forwards native events
//! - [`IceAdapter`] trickles candidates in both directions, buffering until
//!   the connection and remote description are ready
//! - [`MediaAdapter`] publishes local tracks and tracks remote streams
//! - [`LocalTracksAdapter`] owns capture and the local tracks themselves
//! - [`PeerConnectionsAdapter`] creates, looks up and closes coordinators
//!
//! The platform WebRTC stack sits behind the traits in [`native`].

pub mod connections;
pub mod coordinator;
pub mod error;
pub mod ice_adapter;
pub mod local_tracks;
pub mod media_adapter;
pub mod native;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use connections::PeerConnectionsAdapter;
pub use coordinator::{Action, CoordinatorConfig, PeerConnectionCoordinator};
pub use error::{PeerError, PeerResult};
pub use ice_adapter::{IceAdapter, IceAdapterConfig};
pub use local_tracks::{CaptureProvider, LocalTracksAdapter, ScreenShareType};
pub use media_adapter::{MediaAdapter, PublishedMedia, default_send_encodings};
pub use native::{PeerConnection, PeerConnectionFactory, RtpSender, RtpTransceiver};
pub use types::{
    IceCandidateErrorEvent, IceConnectionState, IceGatheringState, MediaStream, MediaStreamTrack, OfferConstraints,
    PeerConnectionEvent, PeerConnectionState, RtcConfiguration, RtcStatistic, RtcStatsReport, RtpEncodingParameters,
    SignalingState, TrackKind, TransceiverDirection, TransceiverInit,
};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::connections::PeerConnectionsAdapter;
    pub use crate::coordinator::{Action, PeerConnectionCoordinator};
    pub use crate::error::{PeerError, PeerResult};
    pub use crate::local_tracks::{CaptureProvider, LocalTracksAdapter};
    pub use crate::native::{PeerConnection, PeerConnectionFactory};
    pub use crate::types::{MediaStreamTrack, PeerConnectionEvent, RtcStatsReport, TrackKind};
}
