//! Shared domain models for the signaling layer

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{SignalError, SignalResult};

/// Which of the two peer connections a message concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerConnectionType {
    /// Sends local media to the SFU
    Publisher,
    /// Receives remote media from the SFU
    Subscriber,
}

impl PeerConnectionType {
    /// Wire-level peer type for this side
    pub fn peer_type(self) -> PeerType {
        match self {
            Self::Publisher => PeerType::PublisherUnspecified,
            Self::Subscriber => PeerType::Subscriber,
        }
    }
}

impl fmt::Display for PeerConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Publisher => write!(f, "publisher"),
            Self::Subscriber => write!(f, "subscriber"),
        }
    }
}

/// Peer type as carried in SFU messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeerType {
    /// The publishing side (the SFU's default value)
    PublisherUnspecified,
    /// The subscribing side
    Subscriber,
}

impl From<PeerType> for PeerConnectionType {
    fn from(value: PeerType) -> Self {
        match value {
            PeerType::PublisherUnspecified => PeerConnectionType::Publisher,
            PeerType::Subscriber => PeerConnectionType::Subscriber,
        }
    }
}

/// Kind of media a track carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    Audio,
    Video,
    ScreenShare,
    Unknown,
}

impl TrackType {
    /// Suffix used in remote stream ids for this track type
    pub fn stream_suffix(self) -> &'static str {
        match self {
            Self::Audio => "TRACK_TYPE_AUDIO",
            Self::Video => "TRACK_TYPE_VIDEO",
            Self::ScreenShare => "TRACK_TYPE_SCREEN_SHARE",
            Self::Unknown => "TRACK_TYPE_UNSPECIFIED",
        }
    }

    /// Parse a stream id suffix back into a track type
    pub fn from_stream_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "TRACK_TYPE_AUDIO" => Some(Self::Audio),
            "TRACK_TYPE_VIDEO" => Some(Self::Video),
            "TRACK_TYPE_SCREEN_SHARE" => Some(Self::ScreenShare),
            _ => None,
        }
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
            Self::ScreenShare => write!(f, "screenshare"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// An ICE candidate as exchanged with the native connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IceCandidate {
    /// The candidate line
    pub sdp: String,
    /// Media stream identification tag
    pub sdp_mid: Option<String>,
    /// Index of the media line the candidate belongs to
    pub sdp_mline_index: i32,
}

/// JSON envelope understood by the SFU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidateEnvelope {
    candidate: String,
    #[serde(default)]
    sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    sdp_mline_index: i32,
}

impl IceCandidate {
    pub fn new(sdp: impl Into<String>, sdp_mid: Option<String>, sdp_mline_index: i32) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_mid,
            sdp_mline_index,
        }
    }

    /// Encode as `{candidate, sdpMid, sdpMLineIndex}`
    pub fn to_json(&self) -> SignalResult<String> {
        let envelope = CandidateEnvelope {
            candidate: self.sdp.clone(),
            sdp_mid: self.sdp_mid.clone(),
            sdp_mline_index: self.sdp_mline_index,
        };
        serde_json::to_string(&envelope).map_err(|e| SignalError::encoding(e.to_string()))
    }

    /// Decode a candidate received in an SFU trickle message
    ///
    /// Only the `candidate` field is required; the SFU addresses candidates
    /// to the first media line.
    pub fn from_json(json: &str) -> SignalResult<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| SignalError::encoding(e.to_string()))?;
        let sdp = value
            .get("candidate")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SignalError::encoding("ICE trickle payload has no candidate field"))?;
        Ok(Self::new(sdp, None, 0))
    }
}

/// Kind of session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    PrAnswer,
    Answer,
    Rollback,
}

/// An SDP offer or answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// State of the signaling transport
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Initialized,
    Connecting,
    Authenticating,
    Connected,
    Disconnecting,
    Disconnected { reason: Option<String> },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Connected or on the way there
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Authenticating | Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Connecting => write!(f, "connecting"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnecting => write!(f, "disconnecting"),
            Self::Disconnected { reason: Some(reason) } => write!(f, "disconnected ({})", reason),
            Self::Disconnected { reason: None } => write!(f, "disconnected"),
        }
    }
}

/// Reconnection approach suggested by the SFU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectionStrategy {
    Unspecified,
    Disconnect,
    #[default]
    Fast,
    Rejoin,
    Migrate,
}

/// Capabilities granted to the local participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OwnCapability {
    SendAudio,
    SendVideo,
    Screenshare,
}

/// Camera facing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraPosition {
    #[default]
    Front,
    Back,
}

impl CameraPosition {
    pub fn flipped(self) -> Self {
        match self {
            Self::Front => Self::Back,
            Self::Back => Self::Front,
        }
    }
}

/// Media settings of the current call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSettings {
    pub audio_on: bool,
    pub video_on: bool,
    pub speaker_on: bool,
    pub camera_position: CameraPosition,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            audio_on: true,
            video_on: true,
            speaker_on: true,
            camera_position: CameraPosition::Front,
        }
    }
}

/// A simulcast layer announced to the SFU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoLayer {
    pub rid: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub fps: u32,
}

/// A published track as announced to the SFU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub track_id: String,
    pub track_type: TrackType,
    pub mid: String,
    pub layers: Vec<VideoLayer>,
    pub muted: bool,
}

/// Width and height of a video track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoDimension {
    pub width: u32,
    pub height: u32,
}

/// A remote track the subscriber wants to receive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSubscriptionDetails {
    pub user_id: String,
    pub session_id: String,
    pub track_type: TrackType,
    pub dimension: Option<VideoDimension>,
}

/// Mute state of one published track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMuteState {
    pub track_type: TrackType,
    pub muted: bool,
}

/// Description of the client sent with join requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDetails {
    pub sdk: String,
    pub sdk_version: String,
    pub os: String,
    pub device: String,
}

impl Default for ClientDetails {
    fn default() -> Self {
        Self {
            sdk: "vidcall-rust".to_string(),
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            device: std::env::consts::ARCH.to_string(),
        }
    }
}
