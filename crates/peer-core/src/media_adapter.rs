//! Media Adapter
//!
//! Keeps the published senders/transceivers of one side and indexes the
//! remote streams announced by the native connection.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};
use vidcall_infra_common::DisposableBag;
use vidcall_signal_core::models::VideoLayer;
use vidcall_signal_core::{PeerConnectionType, TrackInfo, TrackType};

use crate::error::PeerResult;
use crate::native::{PeerConnection, RtpSender, RtpTransceiver};
use crate::types::{
    MediaStream, MediaStreamTrack, PeerConnectionEvent, RtpEncodingParameters, TransceiverDirection, TransceiverInit,
};

/// A published track: either a plain sender or a transceiver
#[derive(Clone)]
pub enum PublishedMedia {
    Sender(Arc<dyn RtpSender>),
    Transceiver(Arc<dyn RtpTransceiver>),
}

impl PublishedMedia {
    pub fn sender(&self) -> Arc<dyn RtpSender> {
        match self {
            Self::Sender(sender) => sender.clone(),
            Self::Transceiver(transceiver) => transceiver.sender(),
        }
    }

    /// Negotiated mid; plain senders have none
    pub fn mid(&self) -> Option<String> {
        match self {
            Self::Sender(_) => None,
            Self::Transceiver(transceiver) => transceiver.mid(),
        }
    }

    fn stop(&self, peer_connection: &Arc<dyn PeerConnection>) {
        match self {
            Self::Sender(sender) => {
                if let Err(e) = peer_connection.remove_track(sender) {
                    warn!(error = %e, "Failed to remove published sender");
                }
            }
            Self::Transceiver(transceiver) => transceiver.stop(),
        }
    }
}

impl std::fmt::Debug for PublishedMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sender(_) => write!(f, "Sender"),
            Self::Transceiver(t) => write!(f, "Transceiver(mid={:?})", t.mid()),
        }
    }
}

#[derive(Default)]
struct MediaStorage {
    screen_shares: HashMap<String, MediaStream>,
    video: HashMap<String, MediaStream>,
    audio: HashMap<String, MediaStream>,
    published: HashMap<TrackType, PublishedMedia>,
}

impl MediaStorage {
    fn streams_mut(&mut self, track_type: TrackType) -> Option<&mut HashMap<String, MediaStream>> {
        match track_type {
            TrackType::ScreenShare => Some(&mut self.screen_shares),
            TrackType::Video => Some(&mut self.video),
            TrackType::Audio => Some(&mut self.audio),
            TrackType::Unknown => None,
        }
    }

    fn streams(&self, track_type: TrackType) -> Option<&HashMap<String, MediaStream>> {
        match track_type {
            TrackType::ScreenShare => Some(&self.screen_shares),
            TrackType::Video => Some(&self.video),
            TrackType::Audio => Some(&self.audio),
            TrackType::Unknown => None,
        }
    }
}

/// Published and received media for one peer connection
pub struct MediaAdapter {
    peer_type: PeerConnectionType,
    peer_connection: Arc<dyn PeerConnection>,
    storage: Arc<Mutex<MediaStorage>>,
    bag: DisposableBag,
}

impl MediaAdapter {
    /// Create an adapter mirroring stream events from `events`
    pub fn new(
        peer_type: PeerConnectionType,
        peer_connection: Arc<dyn PeerConnection>,
        mut events: broadcast::Receiver<PeerConnectionEvent>,
    ) -> Self {
        let storage = Arc::new(Mutex::new(MediaStorage::default()));
        let bag = DisposableBag::new(format!("media-adapter-{}", peer_type));

        let task_storage = storage.clone();
        bag.spawn_keyed("streams", async move {
            loop {
                match events.recv().await {
                    Ok(PeerConnectionEvent::AddedStream(stream)) => add_stream(&task_storage, stream),
                    Ok(PeerConnectionEvent::RemovedStream(stream)) => remove_stream(&task_storage, &stream),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(peer_type = %peer_type, skipped = skipped, "Media adapter lagged behind stream events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self {
            peer_type,
            peer_connection,
            storage,
            bag,
        }
    }

    // ===== Remote media =====

    pub fn audio_track(&self, prefix: &str) -> Option<MediaStreamTrack> {
        self.remote_track(TrackType::Audio, prefix)
    }

    pub fn video_track(&self, prefix: &str) -> Option<MediaStreamTrack> {
        self.remote_track(TrackType::Video, prefix)
    }

    pub fn screen_share_track(&self, prefix: &str) -> Option<MediaStreamTrack> {
        self.remote_track(TrackType::ScreenShare, prefix)
    }

    /// Ids of the remote streams currently indexed under `track_type`
    pub fn remote_stream_ids(&self, track_type: TrackType) -> Vec<String> {
        let storage = self.storage.lock();
        let mut ids: Vec<String> = storage
            .streams(track_type)
            .map(|streams| streams.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Ids of every remote track received under `track_type`
    pub fn remote_track_ids(&self, track_type: TrackType) -> Vec<String> {
        let storage = self.storage.lock();
        let Some(streams) = storage.streams(track_type) else {
            return Vec::new();
        };
        streams
            .values()
            .flat_map(|stream| stream.audio_tracks.iter().chain(stream.video_tracks.iter()))
            .map(|track| track.track_id().to_string())
            .collect()
    }

    fn remote_track(&self, track_type: TrackType, prefix: &str) -> Option<MediaStreamTrack> {
        let storage = self.storage.lock();
        let stream = storage
            .streams(track_type)?
            .values()
            .find(|stream| stream.stream_id.contains(prefix))?;
        match track_type {
            TrackType::Audio => stream.audio_tracks.first().cloned(),
            _ => stream.video_tracks.first().cloned(),
        }
    }

    // ===== Published media =====

    pub fn publishes(&self, track_type: TrackType) -> bool {
        self.storage.lock().published.contains_key(&track_type)
    }

    pub fn published(&self, track_type: TrackType) -> Option<PublishedMedia> {
        self.storage.lock().published.get(&track_type).cloned()
    }

    /// Local track behind the published sender of `track_type`
    pub fn local_track(&self, track_type: TrackType) -> Option<MediaStreamTrack> {
        self.published(track_type).and_then(|published| published.sender().track())
    }

    /// Negotiated mid for video and screen share
    pub fn mid(&self, track_type: TrackType) -> Option<String> {
        match track_type {
            TrackType::Video | TrackType::ScreenShare => self.published(track_type).and_then(|p| p.mid()),
            _ => None,
        }
    }

    /// Publish `track` through a plain sender
    pub fn publish(&self, track: &MediaStreamTrack, track_type: TrackType, stream_ids: &[String]) -> PeerResult<()> {
        match self.peer_connection.add_track(track, stream_ids) {
            Ok(sender) => {
                debug!(peer_type = %self.peer_type, track_id = %track.track_id(), track_type = %track_type, "Published track");
                self.storage.lock().published.insert(track_type, PublishedMedia::Sender(sender));
                Ok(())
            }
            Err(e) => {
                error!(
                    peer_type = %self.peer_type,
                    track_id = %track.track_id(),
                    track_type = %track_type,
                    stream_ids = %stream_ids.join(","),
                    error = %e,
                    "Unable to publish track"
                );
                Err(e)
            }
        }
    }

    /// Publish `track` through a transceiver
    ///
    /// A new screen share replaces the previous one: its transceiver is
    /// stopped and its streams are removed from the connection.
    pub fn publish_with_direction(
        &self,
        track: &MediaStreamTrack,
        track_type: TrackType,
        direction: TransceiverDirection,
        stream_ids: &[String],
    ) -> PeerResult<()> {
        if track_type == TrackType::ScreenShare {
            self.remove_screen_share();
        }

        let init = TransceiverInit {
            direction,
            stream_ids: stream_ids.to_vec(),
            send_encodings: default_send_encodings(track_type),
        };

        match self.peer_connection.add_transceiver(track, &init) {
            Ok(transceiver) => {
                debug!(
                    peer_type = %self.peer_type,
                    track_id = %track.track_id(),
                    track_type = %track_type,
                    direction = ?direction,
                    "Published track with transceiver"
                );
                self.storage
                    .lock()
                    .published
                    .insert(track_type, PublishedMedia::Transceiver(transceiver));
                Ok(())
            }
            Err(e) => {
                error!(
                    peer_type = %self.peer_type,
                    track_id = %track.track_id(),
                    track_type = %track_type,
                    stream_ids = %stream_ids.join(","),
                    error = %e,
                    "Unable to publish track"
                );
                Err(e)
            }
        }
    }

    fn remove_screen_share(&self) {
        let (previous, streams) = {
            let mut storage = self.storage.lock();
            let previous = storage.published.remove(&TrackType::ScreenShare);
            let streams: Vec<MediaStream> = storage.screen_shares.drain().map(|(_, s)| s).collect();
            (previous, streams)
        };

        if let Some(previous) = previous {
            debug!(peer_type = %self.peer_type, "Replacing previous screen share");
            previous.stop(&self.peer_connection);
        }
        for stream in &streams {
            self.peer_connection.remove_stream(stream);
        }
    }

    /// Activate exactly the simulcast layers named in `enabled_rids`
    ///
    /// Only video is adjusted. Parameters are pushed to the sender only when
    /// the resulting encodings differ from the current ones; returns whether
    /// they were pushed.
    pub fn change_publish_quality(&self, track_type: TrackType, enabled_rids: &HashSet<String>) -> bool {
        if track_type != TrackType::Video {
            return false;
        }
        let Some(PublishedMedia::Transceiver(transceiver)) = self.published(track_type) else {
            return false;
        };

        let sender = transceiver.sender();
        let current = sender.parameters();
        let updated: Vec<RtpEncodingParameters> = current
            .iter()
            .map(|encoding| {
                let mut encoding = encoding.clone();
                encoding.active = encoding
                    .rid
                    .as_ref()
                    .is_some_and(|rid| enabled_rids.contains(rid));
                encoding
            })
            .collect();

        if updated == current {
            return false;
        }

        debug!(peer_type = %self.peer_type, encodings = ?updated, "Updating publish quality");
        match sender.set_parameters(updated) {
            Ok(()) => true,
            Err(e) => {
                error!(peer_type = %self.peer_type, error = %e, "Failed to update publish quality");
                false
            }
        }
    }

    /// Announced tracks for a set-publisher request
    pub fn tracks_info(&self) -> Vec<TrackInfo> {
        let published: Vec<(TrackType, PublishedMedia)> = {
            let storage = self.storage.lock();
            storage.published.iter().map(|(t, p)| (*t, p.clone())).collect()
        };

        let mut tracks: Vec<TrackInfo> = published
            .into_iter()
            .filter_map(|(track_type, published)| {
                let sender = published.sender();
                let track = sender.track()?;
                let layers = sender
                    .parameters()
                    .into_iter()
                    .filter_map(|encoding| {
                        Some(VideoLayer {
                            rid: encoding.rid?,
                            width: 0,
                            height: 0,
                            bitrate: encoding.max_bitrate_bps.unwrap_or_default(),
                            fps: encoding.max_framerate.unwrap_or_default(),
                        })
                    })
                    .collect();
                Some(TrackInfo {
                    track_id: track.track_id().to_string(),
                    track_type,
                    mid: published.mid().unwrap_or_default(),
                    layers,
                    muted: !track.is_enabled(),
                })
            })
            .collect();
        tracks.sort_by_key(|t| t.track_type);
        tracks
    }

    /// Stop and forget every published sender and transceiver
    pub fn close(&self) {
        self.bag.cancel_all();
        let published: Vec<PublishedMedia> = self.storage.lock().published.drain().map(|(_, media)| media).collect();
        for media in &published {
            media.stop(&self.peer_connection);
        }
    }
}

impl std::fmt::Debug for MediaAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = self.storage.lock();
        f.debug_struct("MediaAdapter")
            .field("peer_type", &self.peer_type)
            .field("published", &storage.published.keys().collect::<Vec<_>>())
            .field("remote_audio", &storage.audio.len())
            .field("remote_video", &storage.video.len())
            .field("remote_screen_shares", &storage.screen_shares.len())
            .finish()
    }
}

fn add_stream(storage: &Mutex<MediaStorage>, stream: MediaStream) {
    let track_type = stream.track_type();
    let mut storage = storage.lock();
    match storage.streams_mut(track_type) {
        Some(streams) => {
            debug!(stream_id = %stream.stream_id, track_type = %track_type, "Remote stream added");
            streams.insert(stream.stream_id.clone(), stream);
        }
        None => debug!(stream_id = %stream.stream_id, "Ignoring remote stream of unknown type"),
    }
}

fn remove_stream(storage: &Mutex<MediaStorage>, stream: &MediaStream) {
    let track_type = stream.track_type();
    if let Some(streams) = storage.lock().streams_mut(track_type) {
        debug!(stream_id = %stream.stream_id, track_type = %track_type, "Remote stream removed");
        streams.remove(&stream.stream_id);
    }
}

/// Simulcast layers sent for a newly published track
pub fn default_send_encodings(track_type: TrackType) -> Vec<RtpEncodingParameters> {
    match track_type {
        TrackType::Video => vec![
            RtpEncodingParameters {
                rid: Some("q".into()),
                active: true,
                max_bitrate_bps: Some(300_000),
                max_framerate: None,
                scale_resolution_down_by: Some(4.0),
            },
            RtpEncodingParameters {
                rid: Some("h".into()),
                active: true,
                max_bitrate_bps: Some(500_000),
                max_framerate: None,
                scale_resolution_down_by: Some(2.0),
            },
            RtpEncodingParameters {
                rid: Some("f".into()),
                active: true,
                max_bitrate_bps: Some(1_000_000),
                max_framerate: None,
                scale_resolution_down_by: None,
            },
        ],
        TrackType::ScreenShare => vec![RtpEncodingParameters {
            rid: Some("q".into()),
            active: true,
            max_bitrate_bps: Some(1_000_000),
            max_framerate: Some(15),
            scale_resolution_down_by: None,
        }],
        TrackType::Audio | TrackType::Unknown => Vec::new(),
    }
}
