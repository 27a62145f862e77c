//! Interfaces of the native WebRTC stack
//!
//! The peer connection, its senders and transceivers are owned by the
//! platform WebRTC library. The session layer drives them through these
//! traits; callback-based native calls are exposed as async methods.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use vidcall_signal_core::{IceCandidate, PeerConnectionType, SessionDescription};

use crate::error::PeerResult;
use crate::types::{
    MediaStream, MediaStreamTrack, OfferConstraints, PeerConnectionEvent, RtcConfiguration, RtcStatsReport,
    RtpEncodingParameters, SignalingState, TrackKind, TransceiverDirection, TransceiverInit,
};

/// Sending half of a media line
pub trait RtpSender: Send + Sync {
    fn track(&self) -> Option<MediaStreamTrack>;

    /// Current encodings, in order
    fn parameters(&self) -> Vec<RtpEncodingParameters>;

    fn set_parameters(&self, encodings: Vec<RtpEncodingParameters>) -> PeerResult<()>;
}

/// Bidirectional media pipeline bound to one negotiated media line
pub trait RtpTransceiver: Send + Sync {
    fn mid(&self) -> Option<String>;

    fn kind(&self) -> TrackKind;

    fn direction(&self) -> TransceiverDirection;

    fn sender(&self) -> Arc<dyn RtpSender>;

    fn stop(&self);
}

/// A native peer connection
///
/// Events are published for every delegate callback except
/// [`PeerConnectionEvent::HasRemoteDescription`], which the coordinator adds.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn events(&self) -> broadcast::Receiver<PeerConnectionEvent>;

    fn signaling_state(&self) -> SignalingState;

    fn local_description(&self) -> Option<SessionDescription>;

    fn remote_description(&self) -> Option<SessionDescription>;

    async fn create_offer(&self, constraints: OfferConstraints) -> PeerResult<SessionDescription>;

    async fn create_answer(&self) -> PeerResult<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> PeerResult<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> PeerResult<()>;

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> PeerResult<()>;

    fn add_track(&self, track: &MediaStreamTrack, stream_ids: &[String]) -> PeerResult<Arc<dyn RtpSender>>;

    fn remove_track(&self, sender: &Arc<dyn RtpSender>) -> PeerResult<()>;

    fn add_transceiver(&self, track: &MediaStreamTrack, init: &TransceiverInit) -> PeerResult<Arc<dyn RtpTransceiver>>;

    /// Add a transceiver without a local track, e.g. receive-only
    fn add_transceiver_of_kind(&self, kind: TrackKind, init: &TransceiverInit) -> PeerResult<Arc<dyn RtpTransceiver>>;

    fn remove_stream(&self, stream: &MediaStream);

    fn transceivers(&self) -> Vec<Arc<dyn RtpTransceiver>>;

    /// Restart ICE without a full renegotiation round-trip
    fn restart_ice(&self);

    async fn statistics(&self) -> PeerResult<RtcStatsReport>;

    async fn close(&self);
}

/// Creates native peer connections
pub trait PeerConnectionFactory: Send + Sync {
    fn make_peer_connection(
        &self,
        peer_type: PeerConnectionType,
        configuration: &RtcConfiguration,
    ) -> PeerResult<Arc<dyn PeerConnection>>;
}
