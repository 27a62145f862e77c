//! Audio store state

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::hardware::AudioDeviceModule;
use crate::session::{AudioRoute, AudioSessionConfiguration, StereoConfiguration, WebRtcAudioSessionConfiguration};

/// Single source of truth for the audio session
#[derive(Clone, Serialize)]
pub struct AudioStoreState {
    pub is_active: bool,
    pub is_interrupted: bool,
    pub should_record: bool,
    pub is_recording: bool,
    pub is_microphone_muted: bool,
    pub has_recording_permission: bool,
    #[serde(skip)]
    pub audio_device_module: Option<Arc<dyn AudioDeviceModule>>,
    pub current_route: AudioRoute,
    pub audio_session_configuration: AudioSessionConfiguration,
    pub webrtc_configuration: WebRtcAudioSessionConfiguration,
    pub stereo_configuration: StereoConfiguration,
}

impl AudioStoreState {
    /// Initial state seeded from the persisted defaults and the current route
    pub fn initial(configuration: AudioSessionConfiguration, route: AudioRoute) -> Self {
        Self {
            is_active: false,
            is_interrupted: false,
            should_record: false,
            is_recording: false,
            is_microphone_muted: true,
            has_recording_permission: false,
            audio_device_module: None,
            current_route: route,
            audio_session_configuration: configuration,
            webrtc_configuration: WebRtcAudioSessionConfiguration::default(),
            stereo_configuration: StereoConfiguration::default(),
        }
    }

    pub fn has_audio_device_module(&self) -> bool {
        self.audio_device_module.is_some()
    }

    /// Whether `module` is the module currently in the state
    pub fn is_same_module(&self, module: &Option<Arc<dyn AudioDeviceModule>>) -> bool {
        match (&self.audio_device_module, module) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Default for AudioStoreState {
    fn default() -> Self {
        Self::initial(AudioSessionConfiguration::default(), AudioRoute::empty())
    }
}

// Device modules compare by identity
impl PartialEq for AudioStoreState {
    fn eq(&self, other: &Self) -> bool {
        self.is_active == other.is_active
            && self.is_interrupted == other.is_interrupted
            && self.should_record == other.should_record
            && self.is_recording == other.is_recording
            && self.is_microphone_muted == other.is_microphone_muted
            && self.has_recording_permission == other.has_recording_permission
            && self.is_same_module(&other.audio_device_module)
            && self.current_route == other.current_route
            && self.audio_session_configuration == other.audio_session_configuration
            && self.webrtc_configuration == other.webrtc_configuration
            && self.stereo_configuration == other.stereo_configuration
    }
}

impl fmt::Debug for AudioStoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioStoreState")
            .field("is_active", &self.is_active)
            .field("is_interrupted", &self.is_interrupted)
            .field("should_record", &self.should_record)
            .field("is_recording", &self.is_recording)
            .field("is_microphone_muted", &self.is_microphone_muted)
            .field("has_recording_permission", &self.has_recording_permission)
            .field("audio_device_module", &self.audio_device_module.is_some())
            .field("current_route", &self.current_route)
            .field("audio_session_configuration", &self.audio_session_configuration)
            .field("webrtc_configuration", &self.webrtc_configuration)
            .field("stereo_configuration", &self.stereo_configuration)
            .finish()
    }
}
