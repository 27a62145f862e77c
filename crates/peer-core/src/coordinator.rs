//! Peer Connection Coordinator
//!
//! Owns one native peer connection for one side of the call and wires it to
//! the SFU: the publisher negotiates whenever the native stack asks for it,
//! the subscriber answers the offers pushed by the SFU. ICE trickling and
//! media bookkeeping are delegated to the [`IceAdapter`] and [`MediaAdapter`].

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vidcall_infra_common::{DisposableBag, with_timeout};
use vidcall_signal_core::messages::SubscriberOffer;
use vidcall_signal_core::{PeerConnectionType, SessionDescription, SfuAdapter, SfuEvent, TrackInfo, TrackType};

use crate::error::{PeerError, PeerResult};
use crate::ice_adapter::{IceAdapter, IceAdapterConfig};
use crate::media_adapter::MediaAdapter;
use crate::native::PeerConnection;
use crate::types::{
    MediaStreamTrack, OfferConstraints, PeerConnectionEvent, RtcStatsReport, TransceiverDirection,
};

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// How long publisher negotiation waits for media setup
    pub setup_timeout: Duration,
    pub ice: IceAdapterConfig,
    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            setup_timeout: Duration::from_secs(2),
            ice: IceAdapterConfig::default(),
            event_buffer: 128,
        }
    }
}

/// Imperative operations on the peer connection
#[derive(Debug, Clone)]
pub enum Action {
    AddTrack {
        track: MediaStreamTrack,
        track_type: TrackType,
        stream_ids: Vec<String>,
    },
    AddTransceiver {
        track: MediaStreamTrack,
        track_type: TrackType,
        direction: TransceiverDirection,
        stream_ids: Vec<String>,
    },
    RestartIce,
}

#[derive(Debug)]
enum Negotiation {
    Offer(OfferConstraints),
    SubscriberOffer(SubscriberOffer),
}

/// Coordinates one native peer connection with the SFU
pub struct PeerConnectionCoordinator {
    identifier: Uuid,
    session_id: String,
    peer_type: PeerConnectionType,
    peer_connection: Arc<dyn PeerConnection>,
    sfu_adapter: Arc<SfuAdapter>,
    config: CoordinatorConfig,

    event_tx: broadcast::Sender<PeerConnectionEvent>,
    negotiation_tx: mpsc::UnboundedSender<Negotiation>,
    setup_tx: watch::Sender<bool>,
    closed: AtomicBool,

    media_adapter: MediaAdapter,
    ice_adapter: IceAdapter,
    bag: DisposableBag,
}

impl PeerConnectionCoordinator {
    /// Create a coordinator and start observing
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        session_id: impl Into<String>,
        peer_type: PeerConnectionType,
        peer_connection: Arc<dyn PeerConnection>,
        sfu_adapter: Arc<SfuAdapter>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        let session_id = session_id.into();
        let (event_tx, _) = broadcast::channel(config.event_buffer.max(1));
        let (negotiation_tx, negotiation_rx) = mpsc::unbounded_channel();
        let (setup_tx, _) = watch::channel(false);

        let media_adapter = MediaAdapter::new(peer_type, peer_connection.clone(), event_tx.subscribe());
        let ice_adapter = IceAdapter::new(
            session_id.clone(),
            peer_type,
            peer_connection.clone(),
            sfu_adapter.clone(),
            event_tx.clone(),
            config.ice.clone(),
        );

        let coordinator = Arc::new(Self {
            identifier: Uuid::new_v4(),
            session_id,
            peer_type,
            peer_connection,
            sfu_adapter,
            config,
            event_tx,
            negotiation_tx,
            setup_tx,
            closed: AtomicBool::new(false),
            media_adapter,
            ice_adapter,
            bag: DisposableBag::new(format!("coordinator-{}", peer_type)),
        });

        coordinator.forward_native_events();
        coordinator.spawn_negotiation(negotiation_rx);
        match peer_type {
            PeerConnectionType::Publisher => coordinator.observe_negotiation_needed(),
            PeerConnectionType::Subscriber => {
                coordinator.observe_subscriber_offers();
                coordinator.observe_refresh();
            }
        }

        debug!(
            identifier = %coordinator.identifier,
            session_id = %coordinator.session_id,
            peer_type = %peer_type,
            sfu = %coordinator.sfu_adapter.hostname(),
            "Created peer connection coordinator"
        );
        coordinator
    }

    pub fn peer_type(&self) -> PeerConnectionType {
        self.peer_type
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Typed connection events, including `HasRemoteDescription`
    pub fn subscribe_events(&self) -> broadcast::Receiver<PeerConnectionEvent> {
        self.event_tx.subscribe()
    }

    pub fn media_adapter(&self) -> &MediaAdapter {
        &self.media_adapter
    }

    pub fn ice_adapter(&self) -> &IceAdapter {
        &self.ice_adapter
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ===== Setup =====

    /// Mark media setup as complete, releasing pending negotiation
    pub fn mark_set_up(&self) {
        self.setup_tx.send_replace(true);
    }

    pub fn is_set_up(&self) -> bool {
        *self.setup_tx.borrow()
    }

    /// Wait until media setup has completed, bounded by the setup timeout
    pub async fn ensure_set_up(&self) -> PeerResult<()> {
        if self.is_set_up() {
            return Ok(());
        }
        debug!(peer_type = %self.peer_type, "Ready to negotiate but media setup has not completed, waiting");
        let mut setup_rx = self.setup_tx.subscribe();
        let wait = async move { setup_rx.wait_for(|done| *done).await.is_ok() };
        if !with_timeout("publisher_setup", self.config.setup_timeout, wait).await? {
            return Err(PeerError::Closed {
                peer_type: self.peer_type,
            });
        }
        debug!(peer_type = %self.peer_type, "Media setup completed, ready to negotiate");
        Ok(())
    }

    // ===== Actions =====

    pub fn execute(&self, action: Action) -> PeerResult<()> {
        match action {
            Action::AddTrack {
                track,
                track_type,
                stream_ids,
            } => self.media_adapter.publish(&track, track_type, &stream_ids),
            Action::AddTransceiver {
                track,
                track_type,
                direction,
                stream_ids,
            } => self
                .media_adapter
                .publish_with_direction(&track, track_type, direction, &stream_ids),
            Action::RestartIce => {
                self.restart_ice();
                Ok(())
            }
        }
    }

    pub async fn create_offer(&self, constraints: OfferConstraints) -> PeerResult<SessionDescription> {
        debug!(identifier = %self.identifier, peer_type = %self.peer_type, "Creating offer");
        self.peer_connection.create_offer(constraints).await
    }

    pub async fn create_answer(&self) -> PeerResult<SessionDescription> {
        debug!(identifier = %self.identifier, peer_type = %self.peer_type, "Creating answer");
        self.peer_connection.create_answer().await
    }

    pub async fn set_local_description(&self, description: SessionDescription) -> PeerResult<()> {
        debug!(identifier = %self.identifier, peer_type = %self.peer_type, "Setting local description");
        self.peer_connection.set_local_description(description).await
    }

    /// Apply a remote description and announce `HasRemoteDescription`
    pub async fn set_remote_description(&self, description: SessionDescription) -> PeerResult<()> {
        debug!(identifier = %self.identifier, peer_type = %self.peer_type, "Setting remote description");
        self.peer_connection.set_remote_description(description.clone()).await?;
        let _ = self
            .event_tx
            .send(PeerConnectionEvent::HasRemoteDescription(description));
        Ok(())
    }

    /// Restart ICE
    ///
    /// The subscriber restarts natively; the publisher renegotiates with the
    /// ICE restart constraint.
    pub fn restart_ice(&self) {
        info!(identifier = %self.identifier, peer_type = %self.peer_type, "Restarting ICE");
        match self.peer_type {
            PeerConnectionType::Subscriber => self.peer_connection.restart_ice(),
            PeerConnectionType::Publisher => self.negotiate(OfferConstraints::ice_restart()),
        }
    }

    pub fn change_publish_quality(&self, track_type: TrackType, enabled_rids: &HashSet<String>) -> bool {
        self.media_adapter.change_publish_quality(track_type, enabled_rids)
    }

    pub async fn statistics(&self) -> PeerResult<RtcStatsReport> {
        self.peer_connection.statistics().await
    }

    pub fn mid(&self, track_type: TrackType) -> Option<String> {
        self.media_adapter.mid(track_type)
    }

    pub fn local_track(&self, track_type: TrackType) -> Option<MediaStreamTrack> {
        self.media_adapter.local_track(track_type)
    }

    pub fn tracks_info(&self) -> Vec<TrackInfo> {
        self.media_adapter.tracks_info()
    }

    /// Close the connection and every dependent observer; idempotent
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            identifier = %self.identifier,
            session_id = %self.session_id,
            peer_type = %self.peer_type,
            sfu = %self.sfu_adapter.hostname(),
            "Closing peer connection"
        );
        self.bag.cancel_all();
        self.ice_adapter.stop_observing();
        self.media_adapter.close();
        self.peer_connection.close().await;
    }

    // ===== Observation =====

    fn forward_native_events(self: &Arc<Self>) {
        let mut native_rx = self.peer_connection.events();
        let event_tx = self.event_tx.clone();
        let identifier = self.identifier;
        let peer_type = self.peer_type;
        let sfu_adapter = self.sfu_adapter.clone();
        self.bag.spawn_keyed("native-events", async move {
            loop {
                match native_rx.recv().await {
                    Ok(event) => {
                        match &event {
                            PeerConnectionEvent::IceCandidateFailedToGather(failure) => warn!(
                                identifier = %identifier,
                                peer_type = %peer_type,
                                sfu = %sfu_adapter.hostname(),
                                url = %failure.url,
                                error = %failure.error_text,
                                "Peer connection failed to gather ICE candidates"
                            ),
                            _ => debug!(
                                identifier = %identifier,
                                peer_type = %peer_type,
                                event = %event,
                                "Peer connection received event"
                            ),
                        }
                        let _ = event_tx.send(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(peer_type = %peer_type, skipped = skipped, "Lagged behind native peer connection events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    fn spawn_negotiation(self: &Arc<Self>, mut negotiation_rx: mpsc::UnboundedReceiver<Negotiation>) {
        let weak = Arc::downgrade(self);
        self.bag.spawn_keyed("negotiation", async move {
            while let Some(request) = negotiation_rx.recv().await {
                let Some(coordinator) = weak.upgrade() else { break };
                match request {
                    Negotiation::Offer(constraints) => {
                        if let Err(e) = coordinator.run_publisher_negotiation(constraints).await {
                            error!(peer_type = %coordinator.peer_type, error = %e, "Publisher negotiation failed");
                        }
                    }
                    Negotiation::SubscriberOffer(offer) => {
                        if let Err(e) = coordinator.handle_subscriber_offer(offer).await {
                            error!(peer_type = %coordinator.peer_type, error = %e, "Error handling subscriber offer");
                        }
                    }
                }
            }
        });
    }

    fn observe_negotiation_needed(self: &Arc<Self>) {
        let mut events_rx = self.event_tx.subscribe();
        let weak = Arc::downgrade(self);
        self.bag.spawn_keyed("should-negotiate", async move {
            loop {
                match events_rx.recv().await {
                    Ok(PeerConnectionEvent::ShouldNegotiate) => {
                        let Some(coordinator) = weak.upgrade() else { break };
                        coordinator.negotiate(OfferConstraints::default());
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    fn observe_subscriber_offers(self: &Arc<Self>) {
        let mut events_rx = self.sfu_adapter.subscribe_events();
        let negotiation_tx = self.negotiation_tx.clone();
        let peer_type = self.peer_type;
        let session_id = self.session_id.clone();
        self.bag.spawn_keyed("subscriber-offers", async move {
            loop {
                match events_rx.recv().await {
                    Ok(SfuEvent::SubscriberOffer(offer)) if offer.session_id != session_id => {
                        debug!(
                            peer_type = %peer_type,
                            offer_session_id = %offer.session_id,
                            "Ignoring subscriber offer for another session"
                        );
                    }
                    Ok(SfuEvent::SubscriberOffer(offer)) => {
                        debug!(peer_type = %peer_type, ice_restart = offer.ice_restart, "Received subscriber offer");
                        if negotiation_tx.send(Negotiation::SubscriberOffer(offer)).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(peer_type = %peer_type, skipped = skipped, "Lagged behind SFU events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    fn observe_refresh(self: &Arc<Self>) {
        let mut refresh_rx = self.sfu_adapter.subscribe_refresh();
        let weak = Arc::downgrade(self);
        self.bag.spawn_keyed("refresh", async move {
            loop {
                match refresh_rx.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        let Some(coordinator) = weak.upgrade() else { break };
                        debug!(peer_type = %coordinator.peer_type, "Signaling refreshed, observing subscriber offers again");
                        coordinator.observe_subscriber_offers();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ===== Negotiation =====

    fn negotiate(&self, constraints: OfferConstraints) {
        if self.negotiation_tx.send(Negotiation::Offer(constraints)).is_err() {
            debug!(peer_type = %self.peer_type, "Negotiation requested after close, ignoring");
        }
    }

    async fn run_publisher_negotiation(&self, constraints: OfferConstraints) -> PeerResult<()> {
        debug!(
            identifier = %self.identifier,
            peer_type = %self.peer_type,
            ice_restart = constraints.ice_restart,
            "Negotiating"
        );
        let offer = self.create_offer(constraints).await?;
        self.set_local_description(offer.clone()).await?;
        self.ensure_set_up().await?;

        let tracks = self.tracks_info();
        debug!(
            peer_type = %self.peer_type,
            has_audio = tracks.iter().any(|t| t.track_type == TrackType::Audio),
            has_video = tracks.iter().any(|t| t.track_type == TrackType::Video),
            has_screen_share = tracks.iter().any(|t| t.track_type == TrackType::ScreenShare),
            "Sending set-publisher"
        );
        let answer = self
            .sfu_adapter
            .set_publisher(&offer.sdp, tracks, &self.session_id)
            .await?;
        self.set_remote_description(SessionDescription::answer(answer)).await
    }

    async fn handle_subscriber_offer(&self, offer: SubscriberOffer) -> PeerResult<()> {
        self.set_remote_description(SessionDescription::offer(offer.sdp)).await?;
        let answer = self.create_answer().await?;
        self.set_local_description(answer.clone()).await?;
        self.sfu_adapter
            .send_answer(&answer.sdp, self.peer_type.peer_type(), &self.session_id)
            .await?;
        debug!(peer_type = %self.peer_type, "Subscriber offer was handled");
        Ok(())
    }
}

impl Drop for PeerConnectionCoordinator {
    fn drop(&mut self) {
        self.bag.cancel_all();
        self.ice_adapter.stop_observing();
    }
}

impl std::fmt::Debug for PeerConnectionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnectionCoordinator")
            .field("identifier", &self.identifier)
            .field("session_id", &self.session_id)
            .field("peer_type", &self.peer_type)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPeerConnection;
    use crate::types::{IceCandidateErrorEvent, PeerConnectionState, TrackKind};
    use pretty_assertions::assert_eq;
    use tokio::time::sleep;
    use vidcall_infra_common::RetryPolicy;
    use vidcall_signal_core::messages::SetPublisherResponse;
    use vidcall_signal_core::testing::{MockSignalService, MockSignalTransport};
    use vidcall_signal_core::{ClientDetails, ConnectionState, PeerType, SdpType, SfuAdapterConfig};

    struct Fixture {
        transport: Arc<MockSignalTransport>,
        service: Arc<MockSignalService>,
        sfu: Arc<SfuAdapter>,
        pc: Arc<MockPeerConnection>,
        coordinator: Arc<PeerConnectionCoordinator>,
    }

    fn fixture(peer_type: PeerConnectionType, setup_timeout: Duration) -> Fixture {
        let transport = Arc::new(MockSignalTransport::new("sfu"));
        let service = Arc::new(MockSignalService::new());
        let sfu = Arc::new(SfuAdapter::new(
            transport.clone(),
            service.clone(),
            SfuAdapterConfig {
                rpc_retry: RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2)),
                ..Default::default()
            },
            ClientDetails::default(),
        ));
        let pc = Arc::new(MockPeerConnection::new());
        let config = CoordinatorConfig {
            setup_timeout,
            ..Default::default()
        };
        let coordinator = PeerConnectionCoordinator::new("session-1", peer_type, pc.clone(), sfu.clone(), config);
        Fixture {
            transport,
            service,
            sfu,
            pc,
            coordinator,
        }
    }

    async fn settle() {
        sleep(Duration::from_millis(30)).await;
    }

    #[tokio::test]
    async fn test_remote_description_emits_marker_once() {
        let f = fixture(PeerConnectionType::Subscriber, Duration::from_secs(1));
        let mut events = f.coordinator.subscribe_events();

        f.coordinator
            .set_remote_description(SessionDescription::offer("v=0 offer"))
            .await
            .unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            PeerConnectionEvent::HasRemoteDescription(SessionDescription::offer("v=0 offer"))
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remote_description_failure_propagates_without_marker() {
        let f = fixture(PeerConnectionType::Subscriber, Duration::from_secs(1));
        let mut events = f.coordinator.subscribe_events();
        f.pc.fail_next_set_remote(PeerError::negotiation("set_remote_description", "malformed sdp"));

        let result = f.coordinator.set_remote_description(SessionDescription::offer("bogus")).await;

        assert!(matches!(result, Err(PeerError::Negotiation { .. })));
        assert!(events.try_recv().is_err());
        // the coordinator stays usable
        f.coordinator
            .set_remote_description(SessionDescription::offer("v=0 offer"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_native_events_are_republished() {
        let f = fixture(PeerConnectionType::Subscriber, Duration::from_secs(1));
        let mut events = f.coordinator.subscribe_events();

        f.pc.emit(PeerConnectionEvent::PeerConnectionStateChanged(PeerConnectionState::Connected));
        f.pc.emit(PeerConnectionEvent::IceCandidateFailedToGather(IceCandidateErrorEvent {
            address: "0.0.0.0".into(),
            port: 0,
            url: "turn:turn.example.com".into(),
            error_code: 701,
            error_text: "unreachable".into(),
        }));

        assert_eq!(
            events.recv().await.unwrap(),
            PeerConnectionEvent::PeerConnectionStateChanged(PeerConnectionState::Connected)
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            PeerConnectionEvent::IceCandidateFailedToGather(_)
        ));
    }

    #[tokio::test]
    async fn test_publisher_negotiates_after_setup() {
        let f = fixture(PeerConnectionType::Publisher, Duration::from_secs(1));
        f.service.set_publisher_response(SetPublisherResponse {
            sdp: "v=0 sfu answer".into(),
            ..Default::default()
        });
        f.transport.set_state(ConnectionState::Connected);
        f.coordinator
            .execute(Action::AddTransceiver {
                track: MediaStreamTrack::new("camera", TrackKind::Video),
                track_type: TrackType::Video,
                direction: TransceiverDirection::SendOnly,
                stream_ids: vec!["publisher-video".into()],
            })
            .unwrap();

        f.pc.emit(PeerConnectionEvent::ShouldNegotiate);
        settle().await;
        assert!(f.service.set_publisher_requests().is_empty());

        f.coordinator.mark_set_up();
        settle().await;

        let requests = f.service.set_publisher_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].sdp, f.pc.local_description().unwrap().sdp);
        assert_eq!(requests[0].tracks.len(), 1);
        assert_eq!(requests[0].tracks[0].track_type, TrackType::Video);
        assert_eq!(f.pc.remote_description(), Some(SessionDescription::answer("v=0 sfu answer")));
    }

    #[tokio::test]
    async fn test_publisher_negotiation_times_out_without_setup() {
        let f = fixture(PeerConnectionType::Publisher, Duration::from_millis(20));
        f.transport.set_state(ConnectionState::Connected);

        f.pc.emit(PeerConnectionEvent::ShouldNegotiate);
        sleep(Duration::from_millis(80)).await;

        assert!(f.service.set_publisher_requests().is_empty());
        assert!(f.pc.remote_description().is_none());
    }

    #[tokio::test]
    async fn test_subscriber_answers_sfu_offer() {
        let f = fixture(PeerConnectionType::Subscriber, Duration::from_secs(1));

        f.transport.emit(SfuEvent::SubscriberOffer(SubscriberOffer {
            sdp: "v=0 sfu offer".into(),
            ice_restart: false,
            session_id: "session-1".into(),
        }));
        settle().await;

        assert_eq!(f.pc.remote_description(), Some(SessionDescription::offer("v=0 sfu offer")));
        let local = f.pc.local_description().unwrap();
        assert_eq!(local.sdp_type, SdpType::Answer);
        let answers = f.service.answers();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].peer_type, PeerType::Subscriber);
        assert_eq!(answers[0].sdp, local.sdp);
    }

    #[tokio::test]
    async fn test_subscriber_offers_observed_after_refresh() {
        let f = fixture(PeerConnectionType::Subscriber, Duration::from_secs(1));
        let second = Arc::new(MockSignalTransport::new("sfu-2"));
        f.sfu.refresh(second.clone()).await;
        settle().await;

        second.emit(SfuEvent::SubscriberOffer(SubscriberOffer {
            sdp: "v=0 migrated offer".into(),
            ice_restart: false,
            session_id: "session-1".into(),
        }));
        settle().await;

        assert_eq!(f.service.answers().len(), 1);
    }

    #[tokio::test]
    async fn test_subscriber_ignores_offers_for_other_sessions() {
        let f = fixture(PeerConnectionType::Subscriber, Duration::from_secs(1));

        f.transport.emit(SfuEvent::SubscriberOffer(SubscriberOffer {
            sdp: "v=0 stale offer".into(),
            ice_restart: false,
            session_id: "session-0".into(),
        }));
        settle().await;

        assert!(f.pc.remote_description().is_none());
        assert!(f.service.answers().is_empty());
    }

    #[tokio::test]
    async fn test_restart_ice_per_side() {
        let subscriber = fixture(PeerConnectionType::Subscriber, Duration::from_secs(1));
        subscriber.coordinator.execute(Action::RestartIce).unwrap();
        assert_eq!(subscriber.pc.restart_ice_calls(), 1);

        let publisher = fixture(PeerConnectionType::Publisher, Duration::from_secs(1));
        publisher.coordinator.mark_set_up();
        publisher.transport.set_state(ConnectionState::Connected);
        publisher.coordinator.restart_ice();
        settle().await;

        assert_eq!(publisher.pc.restart_ice_calls(), 0);
        assert_eq!(publisher.pc.offer_constraints(), vec![OfferConstraints::ice_restart()]);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_stops_observation() {
        let f = fixture(PeerConnectionType::Publisher, Duration::from_secs(1));
        f.coordinator.mark_set_up();
        f.transport.set_state(ConnectionState::Connected);

        f.coordinator.close().await;
        f.coordinator.close().await;

        assert!(f.coordinator.is_closed());
        assert_eq!(f.pc.close_calls(), 1);

        f.pc.emit(PeerConnectionEvent::ShouldNegotiate);
        settle().await;
        assert!(f.pc.offer_constraints().is_empty());
    }
}
