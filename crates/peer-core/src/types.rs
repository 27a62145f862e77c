//! Media and connection-state model shared by the peer connection layer

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use vidcall_signal_core::auth::IceServer;
use vidcall_signal_core::{IceCandidate, SessionDescription, TrackType};

/// Media kind of a native track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug)]
struct TrackInner {
    track_id: String,
    kind: TrackKind,
    enabled: AtomicBool,
}

/// Handle to a native media track
///
/// Clones share the same underlying track.
#[derive(Debug, Clone)]
pub struct MediaStreamTrack {
    inner: Arc<TrackInner>,
}

impl MediaStreamTrack {
    pub fn new(track_id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                track_id: track_id.into(),
                kind,
                enabled: AtomicBool::new(true),
            }),
        }
    }

    pub fn track_id(&self) -> &str {
        &self.inner.track_id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }
}

impl PartialEq for MediaStreamTrack {
    fn eq(&self, other: &Self) -> bool {
        self.inner.track_id == other.inner.track_id
    }
}

impl Eq for MediaStreamTrack {}

/// A remote media stream announced by the native connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    /// `<track lookup prefix>:<TRACK_TYPE_...>`
    pub stream_id: String,
    pub audio_tracks: Vec<MediaStreamTrack>,
    pub video_tracks: Vec<MediaStreamTrack>,
}

impl MediaStream {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            audio_tracks: Vec::new(),
            video_tracks: Vec::new(),
        }
    }

    pub fn with_track(mut self, track: MediaStreamTrack) -> Self {
        match track.kind() {
            TrackKind::Audio => self.audio_tracks.push(track),
            TrackKind::Video => self.video_tracks.push(track),
        }
        self
    }

    /// Track type encoded in the stream id, falling back to the track kinds
    pub fn track_type(&self) -> TrackType {
        if let Some(track_type) = self
            .stream_id
            .rsplit_once(':')
            .and_then(|(_, suffix)| TrackType::from_stream_suffix(suffix))
        {
            return track_type;
        }
        if !self.video_tracks.is_empty() {
            TrackType::Video
        } else if !self.audio_tracks.is_empty() {
            TrackType::Audio
        } else {
            TrackType::Unknown
        }
    }

    /// Participant lookup prefix encoded in the stream id
    pub fn lookup_prefix(&self) -> &str {
        self.stream_id
            .rsplit_once(':')
            .map(|(prefix, _)| prefix)
            .unwrap_or(&self.stream_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveLocalPrAnswer,
    HaveRemoteOffer,
    HaveRemotePrAnswer,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IceGatheringState {
    New,
    Gathering,
    Complete,
}

/// Direction of a transceiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransceiverDirection {
    SendRecv,
    #[default]
    SendOnly,
    RecvOnly,
    Inactive,
    Stopped,
}

/// Parameters of one encoding (simulcast layer) of a sender
///
/// Compared field by field; lists of encodings compare in order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RtpEncodingParameters {
    pub rid: Option<String>,
    pub active: bool,
    pub max_bitrate_bps: Option<u32>,
    pub max_framerate: Option<u32>,
    pub scale_resolution_down_by: Option<f64>,
}

impl RtpEncodingParameters {
    pub fn layer(rid: impl Into<String>, active: bool) -> Self {
        Self {
            rid: Some(rid.into()),
            active,
            ..Default::default()
        }
    }
}

/// Options when adding a transceiver
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransceiverInit {
    pub direction: TransceiverDirection,
    pub stream_ids: Vec<String>,
    pub send_encodings: Vec<RtpEncodingParameters>,
}

/// Options when creating an offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OfferConstraints {
    pub ice_restart: bool,
}

impl OfferConstraints {
    pub fn ice_restart() -> Self {
        Self { ice_restart: true }
    }
}

/// Configuration for new native connections
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RtcConfiguration {
    pub ice_servers: Vec<IceServer>,
}

/// One entry of a native statistics report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtcStatistic {
    pub id: String,
    #[serde(rename = "type")]
    pub stat_type: String,
    pub timestamp_us: f64,
    pub values: serde_json::Map<String, serde_json::Value>,
}

impl RtcStatistic {
    pub fn new(id: impl Into<String>, stat_type: impl Into<String>, timestamp_us: f64) -> Self {
        Self {
            id: id.into(),
            stat_type: stat_type.into(),
            timestamp_us,
            values: serde_json::Map::new(),
        }
    }

    pub fn with_value(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn str_value(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    pub fn f64_value(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(|v| v.as_f64())
    }

    pub fn u64_value(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(|v| v.as_u64())
    }
}

/// Native statistics report keyed by stat id
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RtcStatsReport {
    pub timestamp_us: f64,
    pub statistics: HashMap<String, RtcStatistic>,
}

impl RtcStatsReport {
    pub fn new(timestamp_us: f64, statistics: impl IntoIterator<Item = RtcStatistic>) -> Self {
        Self {
            timestamp_us,
            statistics: statistics.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }
}

/// Failure to gather a candidate from an ICE server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidateErrorEvent {
    pub address: String,
    pub port: u16,
    pub url: String,
    pub error_code: u16,
    pub error_text: String,
}

/// Events published by a peer connection
#[derive(Debug, Clone, PartialEq)]
pub enum PeerConnectionEvent {
    /// A remote description was applied successfully
    HasRemoteDescription(SessionDescription),
    ShouldNegotiate,
    SignalingStateChanged(SignalingState),
    AddedStream(MediaStream),
    RemovedStream(MediaStream),
    PeerConnectionStateChanged(PeerConnectionState),
    IceConnectionChanged(IceConnectionState),
    IceGatheringChanged(IceGatheringState),
    DidGenerateIceCandidate(IceCandidate),
    DidRemoveIceCandidates(Vec<IceCandidate>),
    IceCandidateFailedToGather(IceCandidateErrorEvent),
    DidOpenDataChannel(String),
}

impl fmt::Display for PeerConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HasRemoteDescription(d) => write!(f, "has_remote_description({:?})", d.sdp_type),
            Self::ShouldNegotiate => write!(f, "should_negotiate"),
            Self::SignalingStateChanged(s) => write!(f, "signaling_state_changed({:?})", s),
            Self::AddedStream(s) => write!(f, "added_stream({})", s.stream_id),
            Self::RemovedStream(s) => write!(f, "removed_stream({})", s.stream_id),
            Self::PeerConnectionStateChanged(s) => write!(f, "peer_connection_state_changed({:?})", s),
            Self::IceConnectionChanged(s) => write!(f, "ice_connection_changed({:?})", s),
            Self::IceGatheringChanged(s) => write!(f, "ice_gathering_changed({:?})", s),
            Self::DidGenerateIceCandidate(_) => write!(f, "did_generate_ice_candidate"),
            Self::DidRemoveIceCandidates(c) => write!(f, "did_remove_ice_candidates({})", c.len()),
            Self::IceCandidateFailedToGather(e) => write!(f, "ice_candidate_failed_to_gather({})", e.error_code),
            Self::DidOpenDataChannel(label) => write!(f, "did_open_data_channel({})", label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_classification_by_suffix() {
        let stream = MediaStream::new("user-42:TRACK_TYPE_SCREEN_SHARE")
            .with_track(MediaStreamTrack::new("v1", TrackKind::Video));
        assert_eq!(stream.track_type(), TrackType::ScreenShare);
        assert_eq!(stream.lookup_prefix(), "user-42");
    }

    #[test]
    fn test_stream_classification_falls_back_to_track_kind() {
        let video = MediaStream::new("opaque").with_track(MediaStreamTrack::new("v1", TrackKind::Video));
        let audio = MediaStream::new("opaque").with_track(MediaStreamTrack::new("a1", TrackKind::Audio));
        assert_eq!(video.track_type(), TrackType::Video);
        assert_eq!(audio.track_type(), TrackType::Audio);
        assert_eq!(MediaStream::new("empty").track_type(), TrackType::Unknown);
        assert_eq!(audio.lookup_prefix(), "opaque");
    }

    #[test]
    fn test_track_clones_share_enabled_flag() {
        let track = MediaStreamTrack::new("a1", TrackKind::Audio);
        let clone = track.clone();
        clone.set_enabled(false);
        assert!(!track.is_enabled());
    }

    #[test]
    fn test_encoding_lists_compare_in_order() {
        let a = vec![RtpEncodingParameters::layer("q", true), RtpEncodingParameters::layer("f", false)];
        let b = vec![RtpEncodingParameters::layer("f", false), RtpEncodingParameters::layer("q", true)];
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
