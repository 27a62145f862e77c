//! Peer Connections Adapter
//!
//! Stores the publisher and subscriber coordinators of the current session.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use vidcall_signal_core::{PeerConnectionType, SessionDescription, SfuAdapter, TrackType};

use crate::coordinator::{Action, CoordinatorConfig, PeerConnectionCoordinator};
use crate::error::{PeerError, PeerResult};
use crate::local_tracks::LocalTracksAdapter;
use crate::native::PeerConnectionFactory;
use crate::types::{OfferConstraints, RtcConfiguration, TrackKind, TransceiverDirection, TransceiverInit};

const TEMP_AUDIO_STREAM: &str = "temp-audio";
const TEMP_VIDEO_STREAM: &str = "temp-video";

#[derive(Clone)]
struct SignalingBinding {
    sfu_adapter: Arc<SfuAdapter>,
    session_id: String,
}

/// Owner of the per-side peer connection coordinators
pub struct PeerConnectionsAdapter {
    factory: Arc<dyn PeerConnectionFactory>,
    config: CoordinatorConfig,
    rtc_configuration: RwLock<RtcConfiguration>,
    binding: RwLock<Option<SignalingBinding>>,
    connections: DashMap<PeerConnectionType, Arc<PeerConnectionCoordinator>>,
}

impl PeerConnectionsAdapter {
    pub fn new(factory: Arc<dyn PeerConnectionFactory>, config: CoordinatorConfig) -> Self {
        Self {
            factory,
            config,
            rtc_configuration: RwLock::new(RtcConfiguration::default()),
            binding: RwLock::new(None),
            connections: DashMap::new(),
        }
    }

    /// Attach the signaling used by coordinators created from now on
    pub fn set_sfu_adapter(&self, sfu_adapter: Arc<SfuAdapter>, session_id: impl Into<String>) {
        *self.binding.write() = Some(SignalingBinding {
            sfu_adapter,
            session_id: session_id.into(),
        });
    }

    pub fn sfu_adapter(&self) -> Option<Arc<SfuAdapter>> {
        self.binding.read().as_ref().map(|b| b.sfu_adapter.clone())
    }

    pub fn set_rtc_configuration(&self, configuration: RtcConfiguration) {
        *self.rtc_configuration.write() = configuration;
    }

    pub fn coordinator(&self, peer_type: PeerConnectionType) -> Option<Arc<PeerConnectionCoordinator>> {
        self.connections.get(&peer_type).map(|c| c.value().clone())
    }

    pub fn publisher(&self) -> Option<Arc<PeerConnectionCoordinator>> {
        self.coordinator(PeerConnectionType::Publisher)
    }

    pub fn subscriber(&self) -> Option<Arc<PeerConnectionCoordinator>> {
        self.coordinator(PeerConnectionType::Subscriber)
    }

    /// Create the coordinator for `peer_type` unless one exists
    pub fn setup_if_required(&self, peer_type: PeerConnectionType) -> PeerResult<Arc<PeerConnectionCoordinator>> {
        let binding = self.binding(peer_type)?;

        match self.connections.entry(peer_type) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let configuration = self.rtc_configuration.read().clone();
                let peer_connection = self.factory.make_peer_connection(peer_type, &configuration)?;
                let coordinator = PeerConnectionCoordinator::new(
                    binding.session_id,
                    peer_type,
                    peer_connection,
                    binding.sfu_adapter,
                    self.config.clone(),
                );
                info!(peer_type = %peer_type, "Peer connection set up");
                entry.insert(coordinator.clone());
                Ok(coordinator)
            }
        }
    }

    /// Close and forget the coordinators of `peer_types`
    pub async fn close_connections(&self, peer_types: &[PeerConnectionType]) {
        for peer_type in peer_types {
            if let Some((_, coordinator)) = self.connections.remove(peer_type) {
                coordinator.close().await;
            }
        }
    }

    pub async fn close_all(&self) {
        self.close_connections(&[PeerConnectionType::Publisher, PeerConnectionType::Subscriber])
            .await;
    }

    /// Offer from a throwaway connection, used as the subscriber SDP of a join
    pub async fn make_temporary_offer(&self, local_tracks: &LocalTracksAdapter) -> PeerResult<SessionDescription> {
        let binding = self.binding(PeerConnectionType::Subscriber)?;
        let configuration = self.rtc_configuration.read().clone();
        let peer_connection = self
            .factory
            .make_peer_connection(PeerConnectionType::Subscriber, &configuration)?;
        let temporary = PeerConnectionCoordinator::new(
            binding.session_id,
            PeerConnectionType::Subscriber,
            peer_connection.clone(),
            binding.sfu_adapter,
            self.config.clone(),
        );

        let result = async {
            if let Some(track) = local_tracks.audio_track() {
                temporary.execute(Action::AddTrack {
                    track,
                    track_type: TrackType::Audio,
                    stream_ids: vec![TEMP_AUDIO_STREAM.to_string()],
                })?;
            }

            match local_tracks.video_track() {
                Some(track) => temporary.execute(Action::AddTransceiver {
                    track,
                    track_type: TrackType::Video,
                    direction: TransceiverDirection::RecvOnly,
                    stream_ids: vec![TEMP_VIDEO_STREAM.to_string()],
                })?,
                None => {
                    let init = TransceiverInit {
                        direction: TransceiverDirection::RecvOnly,
                        stream_ids: vec![TEMP_VIDEO_STREAM.to_string()],
                        send_encodings: Vec::new(),
                    };
                    peer_connection.add_transceiver_of_kind(TrackKind::Video, &init)?;
                }
            }

            temporary.create_offer(OfferConstraints::default()).await
        }
        .await;

        temporary.close().await;
        debug!(success = result.is_ok(), "Temporary offer created");
        result
    }

    /// Hand the local audio and video tracks to the publisher
    ///
    /// Tracks already published are skipped. The publisher is marked as set
    /// up afterwards, which releases any pending negotiation.
    pub fn publish_local_tracks(&self, local_tracks: &LocalTracksAdapter) -> PeerResult<()> {
        let publisher = self.setup_if_required(PeerConnectionType::Publisher)?;
        let session_id = publisher.session_id().to_string();

        for (track_type, track) in [
            (TrackType::Audio, local_tracks.audio_track()),
            (TrackType::Video, local_tracks.video_track()),
        ] {
            let Some(track) = track else { continue };
            if publisher.media_adapter().publishes(track_type) {
                continue;
            }
            publisher.execute(Action::AddTransceiver {
                track,
                track_type,
                direction: TransceiverDirection::SendOnly,
                stream_ids: vec![format!("{}:{}", session_id, track_type.stream_suffix())],
            })?;
        }

        publisher.mark_set_up();
        Ok(())
    }

    /// Publish a screen share track, replacing any previous one
    pub fn publish_screen_share(&self, local_tracks: &LocalTracksAdapter) -> PeerResult<()> {
        let Some(track) = local_tracks.screen_share_track() else {
            warn!("No screen share track to publish");
            return Err(PeerError::track("no screen share track available"));
        };
        let publisher = self.setup_if_required(PeerConnectionType::Publisher)?;
        let stream_id = format!("{}:{}", publisher.session_id(), TrackType::ScreenShare.stream_suffix());
        publisher.execute(Action::AddTransceiver {
            track,
            track_type: TrackType::ScreenShare,
            direction: TransceiverDirection::SendOnly,
            stream_ids: vec![stream_id],
        })
    }

    fn binding(&self, peer_type: PeerConnectionType) -> PeerResult<SignalingBinding> {
        self.binding
            .read()
            .clone()
            .ok_or(PeerError::MissingSfuAdapter { peer_type })
    }
}

impl std::fmt::Debug for PeerConnectionsAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnectionsAdapter")
            .field("publisher", &self.publisher().is_some())
            .field("subscriber", &self.subscriber().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_tracks::ScreenShareType;
    use crate::native::RtpTransceiver;
    use crate::testing::{MockCaptureProvider, MockPeerConnectionFactory};
    use pretty_assertions::assert_eq;
    use vidcall_signal_core::testing::{MockSignalService, MockSignalTransport};
    use vidcall_signal_core::{CallSettings, ClientDetails, OwnCapability, SdpType, SfuAdapterConfig};

    fn sfu() -> Arc<SfuAdapter> {
        Arc::new(SfuAdapter::new(
            Arc::new(MockSignalTransport::new("sfu")),
            Arc::new(MockSignalService::new()),
            SfuAdapterConfig::default(),
            ClientDetails::default(),
        ))
    }

    fn adapter() -> (Arc<MockPeerConnectionFactory>, PeerConnectionsAdapter) {
        let factory = Arc::new(MockPeerConnectionFactory::new());
        let adapter = PeerConnectionsAdapter::new(factory.clone(), CoordinatorConfig::default());
        (factory, adapter)
    }

    async fn local_tracks() -> LocalTracksAdapter {
        let tracks = LocalTracksAdapter::new(
            Arc::new(MockCaptureProvider::new()),
            [OwnCapability::SendAudio, OwnCapability::SendVideo, OwnCapability::Screenshare],
        );
        tracks.setup_if_required(&CallSettings::default()).await.unwrap();
        tracks
    }

    #[tokio::test]
    async fn test_setup_requires_sfu_adapter() {
        let (_factory, adapter) = adapter();
        let result = adapter.setup_if_required(PeerConnectionType::Publisher);
        assert!(matches!(
            result,
            Err(PeerError::MissingSfuAdapter {
                peer_type: PeerConnectionType::Publisher
            })
        ));
    }

    #[tokio::test]
    async fn test_setup_is_a_noop_when_coordinator_exists() {
        let (factory, adapter) = adapter();
        adapter.set_sfu_adapter(sfu(), "session-1");

        let first = adapter.setup_if_required(PeerConnectionType::Subscriber).unwrap();
        let second = adapter.setup_if_required(PeerConnectionType::Subscriber).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.connections().len(), 1);
        assert_eq!(first.session_id(), "session-1");
    }

    #[tokio::test]
    async fn test_close_connections_removes_and_closes() {
        let (factory, adapter) = adapter();
        adapter.set_sfu_adapter(sfu(), "session-1");
        adapter.setup_if_required(PeerConnectionType::Publisher).unwrap();
        adapter.setup_if_required(PeerConnectionType::Subscriber).unwrap();

        adapter.close_connections(&[PeerConnectionType::Publisher]).await;
        assert!(adapter.publisher().is_none());
        assert!(adapter.subscriber().is_some());

        adapter.close_all().await;
        assert!(adapter.subscriber().is_none());
        assert!(factory.connections().iter().all(|(_, pc)| pc.close_calls() == 1));
    }

    #[tokio::test]
    async fn test_temporary_offer_uses_temp_streams_and_closes() {
        let (factory, adapter) = adapter();
        adapter.set_sfu_adapter(sfu(), "session-1");
        let tracks = local_tracks().await;

        let offer = adapter.make_temporary_offer(&tracks).await.unwrap();

        assert_eq!(offer.sdp_type, SdpType::Offer);
        let connections = factory.connections();
        assert_eq!(connections.len(), 1);
        let (peer_type, pc) = &connections[0];
        assert_eq!(*peer_type, PeerConnectionType::Subscriber);
        assert_eq!(pc.added_tracks()[0].1, vec![TEMP_AUDIO_STREAM.to_string()]);
        let transceiver = &pc.mock_transceivers()[0];
        assert_eq!(transceiver.initial_direction(), TransceiverDirection::RecvOnly);
        assert_eq!(transceiver.stream_ids(), vec![TEMP_VIDEO_STREAM.to_string()]);
        assert_eq!(pc.close_calls(), 1);
        assert_eq!(transceiver.direction(), TransceiverDirection::Stopped);
        assert!(adapter.subscriber().is_none());
    }

    #[tokio::test]
    async fn test_temporary_offer_without_video_track_receives_video() {
        let (factory, adapter) = adapter();
        adapter.set_sfu_adapter(sfu(), "session-1");
        let tracks = LocalTracksAdapter::new(Arc::new(MockCaptureProvider::new()), [OwnCapability::SendAudio]);
        tracks.setup_if_required(&CallSettings::default()).await.unwrap();

        adapter.make_temporary_offer(&tracks).await.unwrap();

        let (_, pc) = &factory.connections()[0];
        let transceivers = pc.mock_transceivers();
        assert_eq!(transceivers.len(), 1);
        assert_eq!(transceivers[0].kind(), TrackKind::Video);
        assert_eq!(transceivers[0].initial_direction(), TransceiverDirection::RecvOnly);
    }

    #[tokio::test]
    async fn test_publish_local_tracks_marks_publisher_set_up() {
        let (_factory, adapter) = adapter();
        adapter.set_sfu_adapter(sfu(), "session-1");
        let tracks = local_tracks().await;

        adapter.publish_local_tracks(&tracks).unwrap();
        adapter.publish_local_tracks(&tracks).unwrap();

        let publisher = adapter.publisher().unwrap();
        assert!(publisher.is_set_up());
        assert!(publisher.media_adapter().publishes(TrackType::Audio));
        assert!(publisher.media_adapter().publishes(TrackType::Video));
        assert_eq!(publisher.tracks_info().len(), 2);

        tracks.make_screen_share_track(ScreenShareType::InApp).await.unwrap();
        adapter.publish_screen_share(&tracks).unwrap();
        assert!(publisher.media_adapter().publishes(TrackType::ScreenShare));
    }
}
