//! Wire messages exchanged with the SFU
//!
//! The schema itself is owned by the SFU; these types mirror the fields the
//! session layer reads and writes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{
    ClientDetails, PeerType, ReconnectionStrategy, TrackInfo, TrackMuteState,
    TrackSubscriptionDetails, TrackType, VideoDimension,
};

/// Error payload carried by SFU responses and error events
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SfuError {
    /// Zero means unspecified
    pub code: u32,
    pub message: String,
    pub should_retry: bool,
}

impl SfuError {
    /// Whether the payload actually reports a failure
    pub fn is_failure(&self) -> bool {
        self.code != 0 && !self.message.is_empty()
    }
}

/// Migration details attached to a join request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Migration {
    pub from_sfu_id: String,
    pub announced_tracks: Vec<TrackInfo>,
    pub subscriptions: Vec<TrackSubscriptionDetails>,
}

/// Join request sent over the signaling transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub session_id: String,
    pub subscriber_sdp: String,
    pub token: String,
    pub fast_reconnect: bool,
    pub client_details: ClientDetails,
    pub migration: Option<Migration>,
}

/// Departure notice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveCallRequest {
    pub session_id: String,
    pub reason: String,
}

/// Messages sent over the persistent signaling transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SignalRequest {
    Join(JoinRequest),
    LeaveCall(LeaveCallRequest),
    HealthCheck,
}

impl SignalRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::LeaveCall(_) => "leave_call",
            Self::HealthCheck => "health_check",
        }
    }
}

/// Result of a successful join
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JoinResponseEvent {
    pub participant_count: u32,
    pub fast_reconnect_deadline_seconds: u32,
    pub reconnected: bool,
}

/// An SDP offer for the subscriber of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberOffer {
    pub sdp: String,
    pub ice_restart: bool,
    pub session_id: String,
}

/// A remote ICE candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceTrickle {
    pub peer_type: PeerType,
    /// JSON-encoded candidate envelope
    pub ice_candidate: String,
    pub session_id: String,
}

/// An error reported by the SFU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SfuErrorEvent {
    pub error: SfuError,
    pub reconnect_strategy: ReconnectionStrategy,
}

/// A participant known to the SFU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub session_id: String,
    pub track_lookup_prefix: String,
    pub published_tracks: Vec<TrackType>,
}

/// A track published or unpublished by a remote participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackUpdate {
    pub user_id: String,
    pub session_id: String,
    pub track_type: TrackType,
}

/// Desired activity of one simulcast layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoLayerSetting {
    pub name: String,
    pub active: bool,
}

/// Per-sender simulcast layer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSender {
    pub track_type: TrackType,
    pub layers: Vec<VideoLayerSetting>,
}

/// Request from the SFU to change which simulcast layers are sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePublishQuality {
    pub video_senders: Vec<VideoSender>,
}

impl ChangePublishQuality {
    /// Rids the SFU wants active for `track_type`
    pub fn enabled_rids(&self, track_type: TrackType) -> Vec<String> {
        self.video_senders
            .iter()
            .filter(|sender| sender.track_type == track_type)
            .flat_map(|sender| sender.layers.iter())
            .filter(|layer| layer.active)
            .map(|layer| layer.name.clone())
            .collect()
    }
}

/// Inbound SFU events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SfuEvent {
    JoinResponse(JoinResponseEvent),
    SubscriberOffer(SubscriberOffer),
    IceTrickle(IceTrickle),
    Error(SfuErrorEvent),
    HealthCheckResponse,
    ParticipantJoined(Participant),
    ParticipantLeft(Participant),
    TrackPublished(TrackUpdate),
    TrackUnpublished(TrackUpdate),
    ChangePublishQuality(ChangePublishQuality),
    GoAway { reason: String },
    CallEnded,
    IceRestart { peer_type: PeerType },
}

impl SfuEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinResponse(_) => "join_response",
            Self::SubscriberOffer(_) => "subscriber_offer",
            Self::IceTrickle(_) => "ice_trickle",
            Self::Error(_) => "error",
            Self::HealthCheckResponse => "health_check_response",
            Self::ParticipantJoined(_) => "participant_joined",
            Self::ParticipantLeft(_) => "participant_left",
            Self::TrackPublished(_) => "track_published",
            Self::TrackUnpublished(_) => "track_unpublished",
            Self::ChangePublishQuality(_) => "change_publish_quality",
            Self::GoAway { .. } => "go_away",
            Self::CallEnded => "call_ended",
            Self::IceRestart { .. } => "ice_restart",
        }
    }
}

impl fmt::Display for SfuEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ===== RPC surface =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPublisherRequest {
    pub sdp: String,
    pub session_id: String,
    pub tracks: Vec<TrackInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SetPublisherResponse {
    pub sdp: String,
    pub session_id: String,
    pub ice_restart: bool,
    pub error: Option<SfuError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendAnswerRequest {
    pub peer_type: PeerType,
    pub sdp: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceTrickleRequest {
    pub peer_type: PeerType,
    pub ice_candidate: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceRestartRequest {
    pub session_id: String,
    pub peer_type: PeerType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSubscriptionsRequest {
    pub session_id: String,
    pub tracks: Vec<TrackSubscriptionDetails>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMuteStatesRequest {
    pub session_id: String,
    pub mute_states: Vec<TrackMuteState>,
}

/// Codec description in a performance report
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Codec {
    pub name: String,
    pub clock_rate: u32,
    pub payload_type: u32,
    pub fmtp: String,
}

/// Normalized encoder or decoder performance sample
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub track_type: Option<TrackType>,
    pub codec: Codec,
    pub avg_frame_time_ms: f32,
    pub avg_fps: f32,
    pub video_dimension: VideoDimension,
    pub target_bitrate: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SendStatsRequest {
    pub session_id: String,
    pub unified_session_id: String,
    /// JSON-encoded publisher statistics
    pub publisher_stats: String,
    /// JSON-encoded subscriber statistics
    pub subscriber_stats: String,
    /// JSON-encoded peer connection traces
    pub rtc_stats: String,
    pub encode_stats: Vec<PerformanceStats>,
    pub decode_stats: Vec<PerformanceStats>,
    pub sdk_version: String,
}

/// Response shared by RPCs that carry no payload beyond an error
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RpcResponse {
    pub error: Option<SfuError>,
}
