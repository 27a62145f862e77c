//! Local Tracks Adapter
//!
//! Owns the locally captured tracks. Audio and video tracks are created
//! lazily, at most once each, and only when the participant holds the
//! matching capability. Screen share tracks are created explicitly.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use vidcall_signal_core::{CallSettings, CameraPosition, OwnCapability, TrackType};

use crate::error::{PeerError, PeerResult};
use crate::types::MediaStreamTrack;

/// Source of a screen share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenShareType {
    /// Capture of the application's own content
    InApp,
    /// Capture through a system broadcast extension
    Broadcast,
}

/// Device capture pipeline producing local tracks
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    fn make_audio_track(&self) -> PeerResult<MediaStreamTrack>;

    fn make_video_track(&self) -> PeerResult<MediaStreamTrack>;

    fn make_screen_share_track(&self, share_type: ScreenShareType) -> PeerResult<MediaStreamTrack>;

    async fn start_camera_capture(&self, position: CameraPosition) -> PeerResult<()>;

    async fn stop_camera_capture(&self) -> PeerResult<()>;

    async fn switch_camera(&self, position: CameraPosition) -> PeerResult<()>;

    async fn stop_screen_capture(&self, share_type: ScreenShareType) -> PeerResult<()>;
}

#[derive(Debug, Default)]
struct CaptureState {
    camera_position: Option<CameraPosition>,
    screen_share_type: Option<ScreenShareType>,
}

/// Local audio, video and screen share tracks of the participant
pub struct LocalTracksAdapter {
    capture: Arc<dyn CaptureProvider>,
    capabilities: RwLock<HashSet<OwnCapability>>,
    tracks: Mutex<HashMap<TrackType, MediaStreamTrack>>,
    capture_state: Mutex<CaptureState>,
    /// Serializes setup so concurrent callers create each track once
    setup_lock: tokio::sync::Mutex<()>,
}

impl LocalTracksAdapter {
    pub fn new(capture: Arc<dyn CaptureProvider>, capabilities: impl IntoIterator<Item = OwnCapability>) -> Self {
        Self {
            capture,
            capabilities: RwLock::new(capabilities.into_iter().collect()),
            tracks: Mutex::new(HashMap::new()),
            capture_state: Mutex::new(CaptureState::default()),
            setup_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn has_capability(&self, capability: OwnCapability) -> bool {
        self.capabilities.read().contains(&capability)
    }

    /// Replace the granted capabilities
    pub fn update_capabilities(&self, capabilities: impl IntoIterator<Item = OwnCapability>) {
        let capabilities: HashSet<OwnCapability> = capabilities.into_iter().collect();
        debug!(capabilities = ?capabilities, "Updating own capabilities");
        *self.capabilities.write() = capabilities;
    }

    pub fn audio_track(&self) -> Option<MediaStreamTrack> {
        self.track(TrackType::Audio)
    }

    pub fn video_track(&self) -> Option<MediaStreamTrack> {
        self.track(TrackType::Video)
    }

    pub fn screen_share_track(&self) -> Option<MediaStreamTrack> {
        self.track(TrackType::ScreenShare)
    }

    pub fn track(&self, track_type: TrackType) -> Option<MediaStreamTrack> {
        self.tracks.lock().get(&track_type).cloned()
    }

    /// Camera position the video track is capturing from
    pub fn camera_position(&self) -> Option<CameraPosition> {
        self.capture_state.lock().camera_position
    }

    /// Create the audio and video tracks the participant may send
    ///
    /// Tracks that already exist are left untouched.
    pub async fn setup_if_required(&self, settings: &CallSettings) -> PeerResult<()> {
        let _guard = self.setup_lock.lock().await;

        if self.has_capability(OwnCapability::SendAudio) && self.audio_track().is_none() {
            let track = self.capture.make_audio_track()?;
            track.set_enabled(settings.audio_on);
            info!(track_id = %track.track_id(), enabled = settings.audio_on, "Created local audio track");
            self.tracks.lock().insert(TrackType::Audio, track);
        }

        if self.has_capability(OwnCapability::SendVideo) && self.video_track().is_none() {
            let previous_position = self.capture_state.lock().camera_position.take();
            if previous_position.is_some() {
                if let Err(e) = self.capture.stop_camera_capture().await {
                    error!(error = %e, "Failed to stop previous camera capture");
                }
            }

            let track = self.capture.make_video_track()?;
            track.set_enabled(settings.video_on);
            let position = settings.camera_position;
            match self.capture.start_camera_capture(position).await {
                Ok(()) => {
                    self.capture_state.lock().camera_position = Some(position);
                }
                Err(e) => error!(error = %e, position = ?position, "Failed to start camera capture"),
            }
            info!(track_id = %track.track_id(), enabled = settings.video_on, position = ?position, "Created local video track");
            self.tracks.lock().insert(TrackType::Video, track);
        }

        Ok(())
    }

    /// Create a screen share track, stopping any previous screen capture
    pub async fn make_screen_share_track(&self, share_type: ScreenShareType) -> PeerResult<MediaStreamTrack> {
        if !self.has_capability(OwnCapability::Screenshare) {
            return Err(PeerError::MissingCapability {
                capability: OwnCapability::Screenshare,
            });
        }

        self.stop_screen_capture().await;

        let track = self.capture.make_screen_share_track(share_type)?;
        info!(track_id = %track.track_id(), share_type = ?share_type, "Created screen share track");
        self.capture_state.lock().screen_share_type = Some(share_type);
        self.tracks.lock().insert(TrackType::ScreenShare, track.clone());
        Ok(track)
    }

    /// Stop screen capture and drop the screen share track
    pub async fn stop_screen_share(&self) {
        self.stop_screen_capture().await;
        if let Some(track) = self.tracks.lock().remove(&TrackType::ScreenShare) {
            track.set_enabled(false);
            debug!(track_id = %track.track_id(), "Removed screen share track");
        }
    }

    /// Apply new call settings to the existing tracks
    pub async fn did_update_call_settings(&self, settings: &CallSettings) -> PeerResult<()> {
        if let Some(track) = self.audio_track() {
            track.set_enabled(settings.audio_on);
        }
        if let Some(track) = self.video_track() {
            track.set_enabled(settings.video_on);

            let current = self.camera_position();
            if current.is_some_and(|position| position != settings.camera_position) {
                debug!(position = ?settings.camera_position, "Switching camera");
                self.capture.switch_camera(settings.camera_position).await?;
                self.capture_state.lock().camera_position = Some(settings.camera_position);
            }
        }
        Ok(())
    }

    /// Stop every capture and release all tracks
    pub async fn stop_all(&self) {
        self.stop_screen_share().await;
        if self.capture_state.lock().camera_position.take().is_some() {
            if let Err(e) = self.capture.stop_camera_capture().await {
                error!(error = %e, "Failed to stop camera capture");
            }
        }
        let released: Vec<MediaStreamTrack> = self.tracks.lock().drain().map(|(_, track)| track).collect();
        for track in released {
            track.set_enabled(false);
        }
    }

    async fn stop_screen_capture(&self) {
        let previous = self.capture_state.lock().screen_share_type.take();
        if let Some(previous) = previous {
            if let Err(e) = self.capture.stop_screen_capture(previous).await {
                error!(error = %e, share_type = ?previous, "Failed to stop screen capture");
            }
        }
    }
}

impl std::fmt::Debug for LocalTracksAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTracksAdapter")
            .field("tracks", &self.tracks.lock().keys().collect::<Vec<_>>())
            .field("capture_state", &*self.capture_state.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCaptureProvider;
    use pretty_assertions::assert_eq;

    fn all_capabilities() -> Vec<OwnCapability> {
        vec![OwnCapability::SendAudio, OwnCapability::SendVideo, OwnCapability::Screenshare]
    }

    #[tokio::test]
    async fn test_setup_creates_tracks_once() {
        let capture = Arc::new(MockCaptureProvider::new());
        let adapter = LocalTracksAdapter::new(capture.clone(), all_capabilities());
        let settings = CallSettings {
            audio_on: false,
            camera_position: CameraPosition::Back,
            ..Default::default()
        };

        adapter.setup_if_required(&settings).await.unwrap();
        adapter.setup_if_required(&settings).await.unwrap();

        assert_eq!(capture.audio_tracks_made(), 1);
        assert_eq!(capture.video_tracks_made(), 1);
        assert!(!adapter.audio_track().unwrap().is_enabled());
        assert!(adapter.video_track().unwrap().is_enabled());
        assert_eq!(capture.camera_starts(), vec![CameraPosition::Back]);
        assert_eq!(adapter.camera_position(), Some(CameraPosition::Back));
    }

    #[tokio::test]
    async fn test_setup_is_gated_by_capabilities() {
        let capture = Arc::new(MockCaptureProvider::new());
        let adapter = LocalTracksAdapter::new(capture.clone(), [OwnCapability::SendAudio]);

        adapter.setup_if_required(&CallSettings::default()).await.unwrap();

        assert!(adapter.audio_track().is_some());
        assert!(adapter.video_track().is_none());
        assert_eq!(capture.video_tracks_made(), 0);

        adapter.update_capabilities(all_capabilities());
        adapter.setup_if_required(&CallSettings::default()).await.unwrap();
        assert!(adapter.video_track().is_some());
        assert_eq!(capture.audio_tracks_made(), 1);
    }

    #[tokio::test]
    async fn test_screen_share_requires_capability() {
        let adapter = LocalTracksAdapter::new(Arc::new(MockCaptureProvider::new()), [OwnCapability::SendAudio]);

        let result = adapter.make_screen_share_track(ScreenShareType::InApp).await;
        assert!(matches!(
            result,
            Err(PeerError::MissingCapability {
                capability: OwnCapability::Screenshare
            })
        ));
    }

    #[tokio::test]
    async fn test_new_screen_share_stops_previous_capturer() {
        let capture = Arc::new(MockCaptureProvider::new());
        let adapter = LocalTracksAdapter::new(capture.clone(), all_capabilities());

        let first = adapter.make_screen_share_track(ScreenShareType::InApp).await.unwrap();
        let second = adapter.make_screen_share_track(ScreenShareType::Broadcast).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(capture.screen_capture_stops(), vec![ScreenShareType::InApp]);
        assert_eq!(adapter.screen_share_track(), Some(second));

        adapter.stop_screen_share().await;
        assert!(adapter.screen_share_track().is_none());
        assert_eq!(
            capture.screen_capture_stops(),
            vec![ScreenShareType::InApp, ScreenShareType::Broadcast]
        );
    }

    #[tokio::test]
    async fn test_call_settings_update_tracks_and_flip_camera() {
        let capture = Arc::new(MockCaptureProvider::new());
        let adapter = LocalTracksAdapter::new(capture.clone(), all_capabilities());
        adapter.setup_if_required(&CallSettings::default()).await.unwrap();

        let settings = CallSettings {
            audio_on: false,
            video_on: false,
            camera_position: CameraPosition::Front.flipped(),
            ..Default::default()
        };
        adapter.did_update_call_settings(&settings).await.unwrap();

        assert!(!adapter.audio_track().unwrap().is_enabled());
        assert!(!adapter.video_track().unwrap().is_enabled());
        assert_eq!(capture.camera_switches(), vec![CameraPosition::Back]);

        adapter.did_update_call_settings(&settings).await.unwrap();
        assert_eq!(capture.camera_switches().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_all_releases_everything() {
        let capture = Arc::new(MockCaptureProvider::new());
        let adapter = LocalTracksAdapter::new(capture.clone(), all_capabilities());
        adapter.setup_if_required(&CallSettings::default()).await.unwrap();
        adapter.make_screen_share_track(ScreenShareType::InApp).await.unwrap();

        adapter.stop_all().await;

        assert!(adapter.audio_track().is_none());
        assert!(adapter.video_track().is_none());
        assert!(adapter.screen_share_track().is_none());
        assert_eq!(capture.camera_stops(), 1);
    }
}
