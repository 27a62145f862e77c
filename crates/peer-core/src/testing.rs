//! Recording test doubles for the native peer connection and capture pipeline

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use vidcall_signal_core::{CameraPosition, IceCandidate, PeerConnectionType, SdpType, SessionDescription};

use crate::error::{PeerError, PeerResult};
use crate::local_tracks::{CaptureProvider, ScreenShareType};
use crate::native::{PeerConnection, PeerConnectionFactory, RtpSender, RtpTransceiver};
use crate::types::{
    MediaStream, MediaStreamTrack, OfferConstraints, PeerConnectionEvent, RtcConfiguration, RtcStatsReport,
    RtpEncodingParameters, SignalingState, TrackKind, TransceiverDirection, TransceiverInit,
};

/// In-memory sender
pub struct MockRtpSender {
    track: Option<MediaStreamTrack>,
    parameters: Mutex<Vec<RtpEncodingParameters>>,
    set_parameters_calls: AtomicUsize,
}

impl MockRtpSender {
    pub fn new(track: Option<MediaStreamTrack>, parameters: Vec<RtpEncodingParameters>) -> Self {
        Self {
            track,
            parameters: Mutex::new(parameters),
            set_parameters_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_parameters_calls(&self) -> usize {
        self.set_parameters_calls.load(Ordering::SeqCst)
    }
}

impl RtpSender for MockRtpSender {
    fn track(&self) -> Option<MediaStreamTrack> {
        self.track.clone()
    }

    fn parameters(&self) -> Vec<RtpEncodingParameters> {
        self.parameters.lock().clone()
    }

    fn set_parameters(&self, encodings: Vec<RtpEncodingParameters>) -> PeerResult<()> {
        self.set_parameters_calls.fetch_add(1, Ordering::SeqCst);
        *self.parameters.lock() = encodings;
        Ok(())
    }
}

/// In-memory transceiver
pub struct MockRtpTransceiver {
    mid: String,
    kind: TrackKind,
    direction: TransceiverDirection,
    stream_ids: Vec<String>,
    sender: Arc<MockRtpSender>,
    stopped: AtomicBool,
}

impl MockRtpTransceiver {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn stream_ids(&self) -> Vec<String> {
        self.stream_ids.clone()
    }

    /// Direction requested when the transceiver was added
    pub fn initial_direction(&self) -> TransceiverDirection {
        self.direction
    }

    pub fn mock_sender(&self) -> Arc<MockRtpSender> {
        self.sender.clone()
    }
}

impl RtpTransceiver for MockRtpTransceiver {
    fn mid(&self) -> Option<String> {
        Some(self.mid.clone())
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn direction(&self) -> TransceiverDirection {
        if self.is_stopped() {
            TransceiverDirection::Stopped
        } else {
            self.direction
        }
    }

    fn sender(&self) -> Arc<dyn RtpSender> {
        self.sender.clone()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Failures {
    add_candidate: usize,
    add_candidate_error: Option<PeerError>,
    set_remote: Option<PeerError>,
}

/// In-memory native peer connection
pub struct MockPeerConnection {
    event_tx: broadcast::Sender<PeerConnectionEvent>,
    signaling_state: Mutex<SignalingState>,
    local_description: Mutex<Option<SessionDescription>>,
    remote_description: Mutex<Option<SessionDescription>>,
    offer_constraints: Mutex<Vec<OfferConstraints>>,
    added_candidates: Mutex<Vec<IceCandidate>>,
    add_candidate_attempts: AtomicUsize,
    added_tracks: Mutex<Vec<(String, Vec<String>)>>,
    transceivers: Mutex<Vec<Arc<MockRtpTransceiver>>>,
    removed_senders: AtomicUsize,
    removed_streams: Mutex<Vec<String>>,
    restart_ice_calls: AtomicUsize,
    close_calls: AtomicUsize,
    statistics: Mutex<RtcStatsReport>,
    failures: Mutex<Failures>,
}

impl MockPeerConnection {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            event_tx,
            signaling_state: Mutex::new(SignalingState::Stable),
            local_description: Mutex::new(None),
            remote_description: Mutex::new(None),
            offer_constraints: Mutex::new(Vec::new()),
            added_candidates: Mutex::new(Vec::new()),
            add_candidate_attempts: AtomicUsize::new(0),
            added_tracks: Mutex::new(Vec::new()),
            transceivers: Mutex::new(Vec::new()),
            removed_senders: AtomicUsize::new(0),
            removed_streams: Mutex::new(Vec::new()),
            restart_ice_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            statistics: Mutex::new(RtcStatsReport::default()),
            failures: Mutex::new(Failures::default()),
        }
    }

    /// Publish a native event
    pub fn emit(&self, event: PeerConnectionEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Set the remote description without going through the coordinator
    pub fn set_remote_description_value(&self, description: Option<SessionDescription>) {
        *self.remote_description.lock() = description;
    }

    pub fn set_statistics(&self, report: RtcStatsReport) {
        *self.statistics.lock() = report;
    }

    /// Fail the next `count` add-candidate attempts with `error`
    pub fn fail_add_candidate(&self, count: usize, error: PeerError) {
        let mut failures = self.failures.lock();
        failures.add_candidate = count;
        failures.add_candidate_error = Some(error);
    }

    pub fn fail_next_set_remote(&self, error: PeerError) {
        self.failures.lock().set_remote = Some(error);
    }

    pub fn added_candidates(&self) -> Vec<IceCandidate> {
        self.added_candidates.lock().clone()
    }

    pub fn add_candidate_attempts(&self) -> usize {
        self.add_candidate_attempts.load(Ordering::SeqCst)
    }

    pub fn offer_constraints(&self) -> Vec<OfferConstraints> {
        self.offer_constraints.lock().clone()
    }

    /// `(track id, stream ids)` of every plain `add_track`
    pub fn added_tracks(&self) -> Vec<(String, Vec<String>)> {
        self.added_tracks.lock().clone()
    }

    pub fn mock_transceivers(&self) -> Vec<Arc<MockRtpTransceiver>> {
        self.transceivers.lock().clone()
    }

    pub fn removed_senders(&self) -> usize {
        self.removed_senders.load(Ordering::SeqCst)
    }

    pub fn removed_streams(&self) -> Vec<String> {
        self.removed_streams.lock().clone()
    }

    pub fn restart_ice_calls(&self) -> usize {
        self.restart_ice_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn next_mid(&self) -> String {
        self.transceivers.lock().len().to_string()
    }

    fn push_transceiver(&self, kind: TrackKind, track: Option<MediaStreamTrack>, init: &TransceiverInit) -> Arc<MockRtpTransceiver> {
        let transceiver = Arc::new(MockRtpTransceiver {
            mid: self.next_mid(),
            kind,
            direction: init.direction,
            stream_ids: init.stream_ids.clone(),
            sender: Arc::new(MockRtpSender::new(track, init.send_encodings.clone())),
            stopped: AtomicBool::new(false),
        });
        self.transceivers.lock().push(transceiver.clone());
        transceiver
    }
}

impl Default for MockPeerConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerConnection for MockPeerConnection {
    fn events(&self) -> broadcast::Receiver<PeerConnectionEvent> {
        self.event_tx.subscribe()
    }

    fn signaling_state(&self) -> SignalingState {
        *self.signaling_state.lock()
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.local_description.lock().clone()
    }

    fn remote_description(&self) -> Option<SessionDescription> {
        self.remote_description.lock().clone()
    }

    async fn create_offer(&self, constraints: OfferConstraints) -> PeerResult<SessionDescription> {
        let mut offers = self.offer_constraints.lock();
        offers.push(constraints);
        Ok(SessionDescription::offer(format!("v=0 offer-{}", offers.len())))
    }

    async fn create_answer(&self) -> PeerResult<SessionDescription> {
        Ok(SessionDescription::answer("v=0 local answer"))
    }

    async fn set_local_description(&self, description: SessionDescription) -> PeerResult<()> {
        *self.signaling_state.lock() = match description.sdp_type {
            SdpType::Offer => SignalingState::HaveLocalOffer,
            _ => SignalingState::Stable,
        };
        *self.local_description.lock() = Some(description);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> PeerResult<()> {
        if let Some(error) = self.failures.lock().set_remote.take() {
            return Err(error);
        }
        *self.signaling_state.lock() = match description.sdp_type {
            SdpType::Offer => SignalingState::HaveRemoteOffer,
            _ => SignalingState::Stable,
        };
        *self.remote_description.lock() = Some(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> PeerResult<()> {
        self.add_candidate_attempts.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.failures.lock();
            if failures.add_candidate > 0 {
                failures.add_candidate -= 1;
                return Err(failures
                    .add_candidate_error
                    .clone()
                    .unwrap_or_else(|| PeerError::native("add_ice_candidate", "failed")));
            }
        }
        self.added_candidates.lock().push(candidate.clone());
        Ok(())
    }

    fn add_track(&self, track: &MediaStreamTrack, stream_ids: &[String]) -> PeerResult<Arc<dyn RtpSender>> {
        self.added_tracks
            .lock()
            .push((track.track_id().to_string(), stream_ids.to_vec()));
        Ok(Arc::new(MockRtpSender::new(Some(track.clone()), Vec::new())))
    }

    fn remove_track(&self, _sender: &Arc<dyn RtpSender>) -> PeerResult<()> {
        self.removed_senders.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn add_transceiver(&self, track: &MediaStreamTrack, init: &TransceiverInit) -> PeerResult<Arc<dyn RtpTransceiver>> {
        Ok(self.push_transceiver(track.kind(), Some(track.clone()), init))
    }

    fn add_transceiver_of_kind(&self, kind: TrackKind, init: &TransceiverInit) -> PeerResult<Arc<dyn RtpTransceiver>> {
        Ok(self.push_transceiver(kind, None, init))
    }

    fn remove_stream(&self, stream: &MediaStream) {
        self.removed_streams.lock().push(stream.stream_id.clone());
    }

    fn transceivers(&self) -> Vec<Arc<dyn RtpTransceiver>> {
        self.transceivers
            .lock()
            .iter()
            .map(|t| t.clone() as Arc<dyn RtpTransceiver>)
            .collect()
    }

    fn restart_ice(&self) {
        self.restart_ice_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn statistics(&self) -> PeerResult<RtcStatsReport> {
        Ok(self.statistics.lock().clone())
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        *self.signaling_state.lock() = SignalingState::Closed;
    }
}

/// Factory handing out [`MockPeerConnection`]s
#[derive(Default)]
pub struct MockPeerConnectionFactory {
    connections: Mutex<Vec<(PeerConnectionType, Arc<MockPeerConnection>)>>,
}

impl MockPeerConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connections(&self) -> Vec<(PeerConnectionType, Arc<MockPeerConnection>)> {
        self.connections.lock().clone()
    }

    /// Most recent connection made for `peer_type`
    pub fn connection(&self, peer_type: PeerConnectionType) -> Option<Arc<MockPeerConnection>> {
        self.connections
            .lock()
            .iter()
            .rev()
            .find(|(t, _)| *t == peer_type)
            .map(|(_, pc)| pc.clone())
    }
}

impl PeerConnectionFactory for MockPeerConnectionFactory {
    fn make_peer_connection(
        &self,
        peer_type: PeerConnectionType,
        _configuration: &RtcConfiguration,
    ) -> PeerResult<Arc<dyn PeerConnection>> {
        let pc = Arc::new(MockPeerConnection::new());
        self.connections.lock().push((peer_type, pc.clone()));
        Ok(pc)
    }
}

/// Capture pipeline producing numbered tracks
#[derive(Default)]
pub struct MockCaptureProvider {
    audio_made: AtomicUsize,
    video_made: AtomicUsize,
    screen_made: AtomicUsize,
    camera_starts: Mutex<Vec<CameraPosition>>,
    camera_stops: AtomicUsize,
    camera_switches: Mutex<Vec<CameraPosition>>,
    screen_stops: Mutex<Vec<ScreenShareType>>,
}

impl MockCaptureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn audio_tracks_made(&self) -> usize {
        self.audio_made.load(Ordering::SeqCst)
    }

    pub fn video_tracks_made(&self) -> usize {
        self.video_made.load(Ordering::SeqCst)
    }

    pub fn camera_starts(&self) -> Vec<CameraPosition> {
        self.camera_starts.lock().clone()
    }

    pub fn camera_stops(&self) -> usize {
        self.camera_stops.load(Ordering::SeqCst)
    }

    pub fn camera_switches(&self) -> Vec<CameraPosition> {
        self.camera_switches.lock().clone()
    }

    pub fn screen_capture_stops(&self) -> Vec<ScreenShareType> {
        self.screen_stops.lock().clone()
    }
}

#[async_trait]
impl CaptureProvider for MockCaptureProvider {
    fn make_audio_track(&self) -> PeerResult<MediaStreamTrack> {
        let n = self.audio_made.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MediaStreamTrack::new(format!("audio-{}", n), TrackKind::Audio))
    }

    fn make_video_track(&self) -> PeerResult<MediaStreamTrack> {
        let n = self.video_made.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MediaStreamTrack::new(format!("video-{}", n), TrackKind::Video))
    }

    fn make_screen_share_track(&self, _share_type: ScreenShareType) -> PeerResult<MediaStreamTrack> {
        let n = self.screen_made.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MediaStreamTrack::new(format!("screen-{}", n), TrackKind::Video))
    }

    async fn start_camera_capture(&self, position: CameraPosition) -> PeerResult<()> {
        self.camera_starts.lock().push(position);
        Ok(())
    }

    async fn stop_camera_capture(&self) -> PeerResult<()> {
        self.camera_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn switch_camera(&self, position: CameraPosition) -> PeerResult<()> {
        self.camera_switches.lock().push(position);
        Ok(())
    }

    async fn stop_screen_capture(&self, share_type: ScreenShareType) -> PeerResult<()> {
        self.screen_stops.lock().push(share_type);
        Ok(())
    }
}
