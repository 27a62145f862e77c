//! Actions accepted by the audio store

use std::fmt;
use std::sync::Arc;

use crate::hardware::AudioDeviceModule;
use crate::session::{AudioCategory, AudioMode, AudioRoute, AudioSessionConfiguration, CategoryOptions, PortOverride};
use crate::state::AudioStoreState;

/// Explicit audio session reconfiguration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSessionAction {
    SetCategory(AudioCategory),
    SetMode(AudioMode),
    SetCategoryOptions(CategoryOptions),
    SetCategoryAndMode(AudioCategory, AudioMode),
    SetCategoryAndOptions(AudioCategory, CategoryOptions),
    SetModeAndOptions(AudioMode, CategoryOptions),
    SetCategoryModeAndOptions(AudioCategory, AudioMode, CategoryOptions),
    SetOverrideOutputPort(PortOverride),
    /// Mirror a change the system made; no hardware call
    SystemDidChange(AudioCategory, AudioMode, CategoryOptions),
}

impl AudioSessionAction {
    /// Configuration that results from applying this action to `current`
    pub fn target(&self, current: &AudioSessionConfiguration) -> AudioSessionConfiguration {
        let mut target = *current;
        match *self {
            Self::SetCategory(category) => target.category = category,
            Self::SetMode(mode) => target.mode = mode,
            Self::SetCategoryOptions(options) => target.options = options,
            Self::SetCategoryAndMode(category, mode) => {
                target.category = category;
                target.mode = mode;
            }
            Self::SetCategoryAndOptions(category, options) => {
                target.category = category;
                target.options = options;
            }
            Self::SetModeAndOptions(mode, options) => {
                target.mode = mode;
                target.options = options;
            }
            Self::SetCategoryModeAndOptions(category, mode, options)
            | Self::SystemDidChange(category, mode, options) => {
                target.category = category;
                target.mode = mode;
                target.options = options;
            }
            Self::SetOverrideOutputPort(port) => target.override_output_port = port,
        }
        target
    }
}

/// Settings of the WebRTC audio session wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebRtcAudioAction {
    SetAudioEnabled(bool),
    SetUseManualAudio(bool),
    SetPrefersNoInterruptionsFromSystemAlerts(bool),
}

/// CallKit session hand-over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKitAction {
    Activate,
    Deactivate,
}

/// A stimulus for the audio store
#[derive(Clone)]
pub enum AudioAction {
    SetActive(bool),
    SetInterrupted(bool),
    SetShouldRecord(bool),
    SetRecording(bool),
    SetMicrophoneMuted(bool),
    SetHasRecordingPermission(bool),
    SetAudioDeviceModule(Option<Arc<dyn AudioDeviceModule>>),
    SetCurrentRoute(AudioRoute),
    SetStereoPlayoutPreferred(bool),
    AudioSession(AudioSessionAction),
    WebRtc(WebRtcAudioAction),
    CallKit(CallKitAction),
}

impl AudioAction {
    /// Whether running the action against `state` would change nothing
    ///
    /// CallKit hand-overs always run.
    pub fn is_redundant(&self, state: &AudioStoreState) -> bool {
        match self {
            Self::SetActive(v) => state.is_active == *v,
            Self::SetInterrupted(v) => state.is_interrupted == *v,
            Self::SetShouldRecord(v) => state.should_record == *v,
            Self::SetRecording(v) => state.is_recording == *v,
            Self::SetMicrophoneMuted(v) => state.is_microphone_muted == *v,
            Self::SetHasRecordingPermission(v) => state.has_recording_permission == *v,
            Self::SetAudioDeviceModule(module) => state.is_same_module(module),
            Self::SetCurrentRoute(route) => state.current_route == *route,
            Self::SetStereoPlayoutPreferred(v) => state.stereo_configuration.playout.preferred == *v,
            Self::AudioSession(action) => {
                action.target(&state.audio_session_configuration) == state.audio_session_configuration
            }
            Self::WebRtc(action) => {
                let config = &state.webrtc_configuration;
                match *action {
                    WebRtcAudioAction::SetAudioEnabled(v) => config.is_audio_enabled == v,
                    WebRtcAudioAction::SetUseManualAudio(v) => config.use_manual_audio == v,
                    WebRtcAudioAction::SetPrefersNoInterruptionsFromSystemAlerts(v) => {
                        config.prefers_no_interruptions_from_system_alerts == v
                    }
                }
            }
            Self::CallKit(_) => false,
        }
    }
}

impl fmt::Debug for AudioAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for AudioAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetActive(v) => write!(f, ".setActive({})", v),
            Self::SetInterrupted(v) => write!(f, ".setInterrupted({})", v),
            Self::SetShouldRecord(v) => write!(f, ".setShouldRecord({})", v),
            Self::SetRecording(v) => write!(f, ".setRecording({})", v),
            Self::SetMicrophoneMuted(v) => write!(f, ".setMicrophoneMuted({})", v),
            Self::SetHasRecordingPermission(v) => write!(f, ".setHasRecordingPermission({})", v),
            Self::SetAudioDeviceModule(m) => write!(f, ".setAudioDeviceModule({})", m.is_some()),
            Self::SetCurrentRoute(r) => write!(f, ".setCurrentRoute(outputs:{})", r.outputs.len()),
            Self::SetStereoPlayoutPreferred(v) => write!(f, ".setStereoPlayoutPreferred({})", v),
            Self::AudioSession(a) => write!(f, ".audioSession({:?})", a),
            Self::WebRtc(a) => write!(f, ".webRtc({:?})", a),
            Self::CallKit(a) => write!(f, ".callKit({:?})", a),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PortOverride;

    #[test]
    fn test_same_configuration_is_redundant() {
        let state = AudioStoreState::default();
        let current = state.audio_session_configuration;

        let same = AudioAction::AudioSession(AudioSessionAction::SetCategoryModeAndOptions(
            current.category,
            current.mode,
            current.options,
        ));
        assert!(same.is_redundant(&state));

        let other = AudioAction::AudioSession(AudioSessionAction::SetCategory(AudioCategory::PlayAndRecord));
        assert!(!other.is_redundant(&state));

        let port = AudioAction::AudioSession(AudioSessionAction::SetOverrideOutputPort(PortOverride::Speaker));
        assert!(!port.is_redundant(&state));
    }

    #[test]
    fn test_callkit_actions_always_run() {
        let mut state = AudioStoreState::default();
        state.is_active = true;
        assert!(!AudioAction::CallKit(CallKitAction::Activate).is_redundant(&state));
        assert!(AudioAction::SetActive(true).is_redundant(&state));
    }
}
