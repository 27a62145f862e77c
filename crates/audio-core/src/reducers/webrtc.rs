use std::sync::Arc;

use crate::actions::{AudioAction, WebRtcAudioAction};
use crate::error::AudioResult;
use crate::hardware::AudioSessionHardware;
use crate::reducers::Reducer;
use crate::state::AudioStoreState;

/// Settings of the WebRTC audio session wrapper
pub struct WebRtcAudioSessionReducer {
    hardware: Arc<dyn AudioSessionHardware>,
}

impl WebRtcAudioSessionReducer {
    pub fn new(hardware: Arc<dyn AudioSessionHardware>) -> Self {
        Self { hardware }
    }
}

impl Reducer for WebRtcAudioSessionReducer {
    fn name(&self) -> &'static str {
        "webrtc_audio_session"
    }

    fn reduce(&self, mut state: AudioStoreState, action: &AudioAction) -> AudioResult<AudioStoreState> {
        let AudioAction::WebRtc(action) = action else {
            return Ok(state);
        };

        let config = &mut state.webrtc_configuration;
        match *action {
            WebRtcAudioAction::SetAudioEnabled(value) => {
                self.hardware.set_audio_enabled(value);
                config.is_audio_enabled = value;
            }
            WebRtcAudioAction::SetUseManualAudio(value) => {
                self.hardware.set_use_manual_audio(value);
                config.use_manual_audio = value;
            }
            WebRtcAudioAction::SetPrefersNoInterruptionsFromSystemAlerts(value) => {
                self.hardware.set_prefers_no_interruptions_from_system_alerts(value)?;
                config.prefers_no_interruptions_from_system_alerts = value;
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AudioError;
    use crate::testing::{HardwareCall, MockAudioSessionHardware};

    #[test]
    fn test_flags_are_forwarded_and_stored() {
        let hardware = Arc::new(MockAudioSessionHardware::new());
        let reducer = WebRtcAudioSessionReducer::new(hardware.clone());

        let state = reducer
            .reduce(
                AudioStoreState::default(),
                &AudioAction::WebRtc(WebRtcAudioAction::SetAudioEnabled(true)),
            )
            .unwrap();
        let state = reducer
            .reduce(state, &AudioAction::WebRtc(WebRtcAudioAction::SetUseManualAudio(true)))
            .unwrap();

        assert!(state.webrtc_configuration.is_audio_enabled);
        assert!(state.webrtc_configuration.use_manual_audio);
        assert_eq!(
            hardware.calls(),
            vec![HardwareCall::SetAudioEnabled(true), HardwareCall::SetUseManualAudio(true)]
        );
    }

    #[test]
    fn test_failed_preference_leaves_state() {
        let hardware = Arc::new(MockAudioSessionHardware::new());
        hardware.fail_next(AudioError::hardware("prefers_no_interruptions", "unsupported"));
        let reducer = WebRtcAudioSessionReducer::new(hardware);

        let result = reducer.reduce(
            AudioStoreState::default(),
            &AudioAction::WebRtc(WebRtcAudioAction::SetPrefersNoInterruptionsFromSystemAlerts(true)),
        );
        assert!(result.is_err());
    }
}
