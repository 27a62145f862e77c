use std::sync::Arc;

use tracing::{debug, info};

use crate::actions::{AudioAction, AudioSessionAction};
use crate::error::{AudioError, AudioResult};
use crate::hardware::AudioSessionHardware;
use crate::reducers::Reducer;
use crate::session::{AudioCategory, AudioSessionConfiguration, CategoryOptions, PortOverride, WebRtcAudioDefaults};
use crate::state::AudioStoreState;

/// Category, mode, options and output override changes
///
/// Every target configuration is validated before the hardware is touched.
/// An active session is deactivated, reconfigured and reactivated, and the
/// new configuration becomes the WebRTC default.
pub struct AudioSessionReducer {
    hardware: Arc<dyn AudioSessionHardware>,
    defaults: WebRtcAudioDefaults,
}

impl AudioSessionReducer {
    pub fn new(hardware: Arc<dyn AudioSessionHardware>, defaults: WebRtcAudioDefaults) -> Self {
        Self { hardware, defaults }
    }

    fn perform_update(
        &self,
        current: &AudioSessionConfiguration,
        target: &AudioSessionConfiguration,
    ) -> AudioResult<()> {
        if current.same_session(target) {
            return Ok(());
        }

        if !target.is_valid() {
            return Err(AudioError::invalid_configuration(
                target.category,
                target.mode,
                target.options,
            ));
        }

        let requires_restart = self.hardware.is_active();
        if requires_restart {
            self.hardware.set_active(false)?;
        }
        self.hardware.set_configuration(target)?;
        if requires_restart {
            self.hardware.set_active(true)?;
        }
        self.defaults.set(*target);

        info!(
            category = %target.category,
            mode = %target.mode,
            options = %target.options,
            restarted = requires_restart,
            "Audio session reconfigured"
        );
        Ok(())
    }

    fn perform_override(&self, current: &AudioSessionConfiguration, port: PortOverride) -> AudioResult<()> {
        if current.override_output_port == port {
            return Ok(());
        }

        if current.category == AudioCategory::PlayAndRecord {
            return self.hardware.override_output_port(port);
        }

        // Other categories express the speaker through their options
        let mut options = self.hardware.category_options();
        let has_speaker = options.contains(CategoryOptions::DEFAULT_TO_SPEAKER);
        match (port == PortOverride::Speaker, has_speaker) {
            (true, false) => options.insert(CategoryOptions::DEFAULT_TO_SPEAKER),
            (false, true) => options.remove(CategoryOptions::DEFAULT_TO_SPEAKER),
            _ => return Ok(()),
        }

        let mut target = *current;
        target.options = options;
        self.perform_update(current, &target)
    }
}

impl Reducer for AudioSessionReducer {
    fn name(&self) -> &'static str {
        "audio_session"
    }

    fn reduce(&self, mut state: AudioStoreState, action: &AudioAction) -> AudioResult<AudioStoreState> {
        let AudioAction::AudioSession(action) = action else {
            return Ok(state);
        };

        let current = state.audio_session_configuration;
        let target = action.target(&current);

        match action {
            AudioSessionAction::SystemDidChange(..) => {
                debug!(configuration = %target, "Mirroring system audio session change");
            }
            AudioSessionAction::SetOverrideOutputPort(port) => {
                self.perform_override(&current, *port)?;
            }
            _ => self.perform_update(&current, &target)?,
        }

        state.audio_session_configuration = target;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AudioMode;
    use crate::testing::{HardwareCall, MockAudioSessionHardware};
    use pretty_assertions::assert_eq;

    fn fixture() -> (Arc<MockAudioSessionHardware>, WebRtcAudioDefaults, AudioSessionReducer) {
        let hardware = Arc::new(MockAudioSessionHardware::new());
        let defaults = WebRtcAudioDefaults::default();
        let reducer = AudioSessionReducer::new(hardware.clone(), defaults.clone());
        (hardware, defaults, reducer)
    }

    fn set(action: AudioSessionAction) -> AudioAction {
        AudioAction::AudioSession(action)
    }

    #[test]
    fn test_active_session_is_restarted_around_reconfiguration() {
        let (hardware, defaults, reducer) = fixture();
        hardware.set_active_state(true);

        let state = reducer
            .reduce(
                AudioStoreState::default(),
                &set(AudioSessionAction::SetCategory(AudioCategory::Playback)),
            )
            .unwrap();

        let expected = AudioSessionConfiguration::new(AudioCategory::Playback, AudioMode::Default, CategoryOptions::NONE);
        assert_eq!(
            hardware.calls(),
            vec![
                HardwareCall::SetActive(false),
                HardwareCall::SetConfiguration(expected),
                HardwareCall::SetActive(true),
            ]
        );
        assert_eq!(state.audio_session_configuration.category, AudioCategory::Playback);
        assert_eq!(defaults.get().category, AudioCategory::Playback);
    }

    #[test]
    fn test_inactive_session_is_not_reactivated() {
        let (hardware, _, reducer) = fixture();

        reducer
            .reduce(
                AudioStoreState::default(),
                &set(AudioSessionAction::SetCategoryAndMode(
                    AudioCategory::PlayAndRecord,
                    AudioMode::VoiceChat,
                )),
            )
            .unwrap();

        let calls = hardware.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], HardwareCall::SetConfiguration(_)));
    }

    #[test]
    fn test_invalid_configuration_is_rejected_before_hardware() {
        let (hardware, defaults, reducer) = fixture();
        hardware.set_active_state(true);

        let result = reducer.reduce(
            AudioStoreState::default(),
            &set(AudioSessionAction::SetCategoryAndOptions(
                AudioCategory::Playback,
                CategoryOptions::ALLOW_BLUETOOTH_HFP,
            )),
        );

        assert!(matches!(result, Err(AudioError::InvalidConfiguration { .. })));
        assert!(hardware.calls().is_empty());
        assert_eq!(defaults.get(), AudioSessionConfiguration::default());
    }

    #[test]
    fn test_same_configuration_makes_no_hardware_call() {
        let (hardware, _, reducer) = fixture();
        let state = AudioStoreState::default();
        let current = state.audio_session_configuration;

        reducer
            .reduce(
                state,
                &set(AudioSessionAction::SetCategoryModeAndOptions(
                    current.category,
                    current.mode,
                    current.options,
                )),
            )
            .unwrap();
        assert!(hardware.calls().is_empty());
    }

    #[test]
    fn test_override_in_play_and_record_uses_port_override() {
        let (hardware, _, reducer) = fixture();
        let mut state = AudioStoreState::default();
        state.audio_session_configuration =
            AudioSessionConfiguration::new(AudioCategory::PlayAndRecord, AudioMode::VoiceChat, CategoryOptions::NONE);

        let state = reducer
            .reduce(state, &set(AudioSessionAction::SetOverrideOutputPort(PortOverride::Speaker)))
            .unwrap();

        assert_eq!(hardware.calls(), vec![HardwareCall::OverrideOutputPort(PortOverride::Speaker)]);
        assert_eq!(state.audio_session_configuration.override_output_port, PortOverride::Speaker);
    }

    #[test]
    fn test_override_in_playback_toggles_default_to_speaker() {
        let (hardware, _, reducer) = fixture();
        let mut state = AudioStoreState::default();
        state.audio_session_configuration =
            AudioSessionConfiguration::new(AudioCategory::Playback, AudioMode::Default, CategoryOptions::NONE);

        reducer
            .reduce(state, &set(AudioSessionAction::SetOverrideOutputPort(PortOverride::Speaker)))
            .unwrap();

        let calls = hardware.calls();
        assert_eq!(calls.len(), 1);
        let HardwareCall::SetConfiguration(configuration) = &calls[0] else {
            panic!("expected a reconfiguration, got {:?}", calls[0]);
        };
        assert!(configuration.options.contains(CategoryOptions::DEFAULT_TO_SPEAKER));
    }

    #[test]
    fn test_system_change_is_mirrored_without_hardware() {
        let (hardware, _, reducer) = fixture();

        let state = reducer
            .reduce(
                AudioStoreState::default(),
                &set(AudioSessionAction::SystemDidChange(
                    AudioCategory::Playback,
                    AudioMode::VoiceChat,
                    CategoryOptions::NONE,
                )),
            )
            .unwrap();

        assert!(hardware.calls().is_empty());
        assert_eq!(state.audio_session_configuration.mode, AudioMode::VoiceChat);
    }
}
