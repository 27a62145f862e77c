use std::sync::Arc;

use tracing::{debug, info};

use crate::actions::AudioAction;
use crate::error::AudioResult;
use crate::hardware::AudioSessionHardware;
use crate::reducers::Reducer;
use crate::session::PortOverride;
use crate::state::AudioStoreState;

/// Flags, route and device-module swaps
pub struct DefaultReducer {
    hardware: Arc<dyn AudioSessionHardware>,
}

impl DefaultReducer {
    pub fn new(hardware: Arc<dyn AudioSessionHardware>) -> Self {
        Self { hardware }
    }
}

impl Reducer for DefaultReducer {
    fn name(&self) -> &'static str {
        "default"
    }

    fn reduce(&self, mut state: AudioStoreState, action: &AudioAction) -> AudioResult<AudioStoreState> {
        match action {
            AudioAction::SetActive(value) => {
                if state.is_active != *value {
                    self.hardware.set_active(*value)?;
                }
                state.is_active = *value;
            }
            AudioAction::SetInterrupted(value) => state.is_interrupted = *value,
            AudioAction::SetShouldRecord(value) => state.should_record = *value,
            AudioAction::SetRecording(value) => state.is_recording = *value,
            AudioAction::SetMicrophoneMuted(value) => state.is_microphone_muted = *value,
            AudioAction::SetHasRecordingPermission(value) => state.has_recording_permission = *value,
            AudioAction::SetAudioDeviceModule(module) => {
                state.audio_device_module = module.clone();
                if module.is_none() {
                    info!("Audio device module removed; resetting recording state");
                    state.is_recording = false;
                    state.is_microphone_muted = true;
                    state.stereo_configuration.playout.preferred = false;
                    state.stereo_configuration.playout.enabled = false;
                }
            }
            AudioAction::SetCurrentRoute(route) => {
                let port = if route.is_speaker() {
                    PortOverride::Speaker
                } else {
                    PortOverride::None
                };
                if state.audio_session_configuration.override_output_port != port {
                    debug!(override_output_port = %port, "Route change updated the output override");
                }
                state.audio_session_configuration.override_output_port = port;
                state.current_route = route.clone();
            }
            AudioAction::SetStereoPlayoutPreferred(value) => {
                state.stereo_configuration.playout.preferred = *value;
            }
            AudioAction::AudioSession(_) | AudioAction::WebRtc(_) | AudioAction::CallKit(_) => {}
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AudioError;
    use crate::session::{AudioPort, AudioRoute, PortType};
    use crate::testing::{HardwareCall, MockAudioDeviceModule, MockAudioSessionHardware};

    fn reducer() -> (Arc<MockAudioSessionHardware>, DefaultReducer) {
        let hardware = Arc::new(MockAudioSessionHardware::new());
        (hardware.clone(), DefaultReducer::new(hardware))
    }

    #[test]
    fn test_set_active_calls_hardware_when_state_differs() {
        let (hardware, reducer) = reducer();
        let state = reducer
            .reduce(AudioStoreState::default(), &AudioAction::SetActive(true))
            .unwrap();

        assert!(state.is_active);
        assert_eq!(hardware.calls(), vec![HardwareCall::SetActive(true)]);
    }

    #[test]
    fn test_set_active_skips_hardware_when_state_matches() {
        let (hardware, reducer) = reducer();
        let state = reducer
            .reduce(AudioStoreState::default(), &AudioAction::SetActive(false))
            .unwrap();

        assert!(!state.is_active);
        assert!(hardware.calls().is_empty());
    }

    #[test]
    fn test_set_active_propagates_hardware_error() {
        let (hardware, reducer) = reducer();
        hardware.fail_next(AudioError::hardware("set_active", "busy"));

        let result = reducer.reduce(AudioStoreState::default(), &AudioAction::SetActive(true));
        assert!(matches!(result, Err(AudioError::Hardware { .. })));
    }

    #[test]
    fn test_removing_module_resets_recording_flags() {
        let (_, reducer) = reducer();
        let mut state = AudioStoreState::default();
        state.audio_device_module = Some(Arc::new(MockAudioDeviceModule::new()));
        state.is_recording = true;
        state.is_microphone_muted = false;
        state.stereo_configuration.playout.preferred = true;
        state.stereo_configuration.playout.enabled = true;

        let state = reducer.reduce(state, &AudioAction::SetAudioDeviceModule(None)).unwrap();

        assert!(state.audio_device_module.is_none());
        assert!(!state.is_recording);
        assert!(state.is_microphone_muted);
        assert!(!state.stereo_configuration.playout.preferred);
        assert!(!state.stereo_configuration.playout.enabled);
    }

    #[test]
    fn test_replacing_module_keeps_recording_flags() {
        let (_, reducer) = reducer();
        let mut state = AudioStoreState::default();
        state.audio_device_module = Some(Arc::new(MockAudioDeviceModule::new()));
        state.is_recording = true;

        let replacement: Arc<dyn crate::hardware::AudioDeviceModule> = Arc::new(MockAudioDeviceModule::new());
        let state = reducer
            .reduce(state, &AudioAction::SetAudioDeviceModule(Some(replacement.clone())))
            .unwrap();

        assert!(state.is_same_module(&Some(replacement)));
        assert!(state.is_recording);
    }

    #[test]
    fn test_speaker_route_mirrors_output_override() {
        let (_, reducer) = reducer();
        let route = AudioRoute::new(
            Vec::new(),
            vec![AudioPort::new(PortType::BuiltInSpeaker, "Speaker", "spk", 2)],
        );

        let state = reducer
            .reduce(AudioStoreState::default(), &AudioAction::SetCurrentRoute(route.clone()))
            .unwrap();
        assert_eq!(state.current_route, route);
        assert_eq!(state.audio_session_configuration.override_output_port, PortOverride::Speaker);
    }
}
