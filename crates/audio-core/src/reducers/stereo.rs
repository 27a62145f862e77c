use tracing::{debug, warn};

use crate::actions::{AudioAction, AudioSessionAction};
use crate::error::AudioResult;
use crate::reducers::Reducer;
use crate::state::AudioStoreState;

/// Derives stereo playout availability
///
/// Stereo is available when the route and the mode both support it, and
/// enabled when it is also preferred and a device module exists. Runs last
/// so it sees the route and mode the earlier reducers produced.
#[derive(Debug, Default)]
pub struct StereoReducer;

impl StereoReducer {
    pub fn new() -> Self {
        Self
    }

    fn affects_stereo(action: &AudioAction) -> bool {
        match action {
            AudioAction::SetCurrentRoute(_)
            | AudioAction::SetStereoPlayoutPreferred(_)
            | AudioAction::SetAudioDeviceModule(_) => true,
            AudioAction::AudioSession(action) => !matches!(action, AudioSessionAction::SetOverrideOutputPort(_)),
            _ => false,
        }
    }
}

impl Reducer for StereoReducer {
    fn name(&self) -> &'static str {
        "stereo"
    }

    fn reduce(&self, mut state: AudioStoreState, action: &AudioAction) -> AudioResult<AudioStoreState> {
        if !Self::affects_stereo(action) {
            return Ok(state);
        }

        let available = state.current_route.supports_stereo_playout()
            && state.audio_session_configuration.mode.supports_stereo_playout();
        let playout = &mut state.stereo_configuration.playout;
        let enabled = playout.preferred && available && state.audio_device_module.is_some();

        if playout.enabled != enabled {
            if let Some(module) = &state.audio_device_module {
                // Hardware refusal only disables stereo
                if let Err(e) = module.set_stereo_playout_enabled(enabled) {
                    warn!(error = %e, "Unable to update stereo playout");
                    playout.available = available;
                    playout.enabled = false;
                    return Ok(state);
                }
            }
            debug!(enabled, available, "Stereo playout updated");
        }

        playout.available = available;
        playout.enabled = enabled;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::session::{AudioCategory, AudioMode, AudioPort, AudioRoute, CategoryOptions, PortType};
    use crate::testing::MockAudioDeviceModule;

    fn stereo_route() -> AudioRoute {
        AudioRoute::new(
            Vec::new(),
            vec![AudioPort::new(PortType::Headphones, "Headphones", "hp", 2)],
        )
    }

    fn state_with_module(module: Arc<MockAudioDeviceModule>) -> AudioStoreState {
        let mut state = AudioStoreState::default();
        state.audio_device_module = Some(module);
        state.stereo_configuration.playout.preferred = true;
        state
    }

    #[test]
    fn test_requires_route_and_mode_support() {
        let module = Arc::new(MockAudioDeviceModule::new());
        let reducer = StereoReducer::new();

        let mut state = state_with_module(module.clone());
        state.current_route = stereo_route();

        let state = reducer
            .reduce(state, &AudioAction::SetCurrentRoute(stereo_route()))
            .unwrap();
        assert!(state.stereo_configuration.playout.available);
        assert!(state.stereo_configuration.playout.enabled);
        assert_eq!(module.stereo_playout_updates(), vec![true]);

        let mut voice = state.clone();
        voice.audio_session_configuration.mode = AudioMode::VoiceChat;
        let state = reducer
            .reduce(
                voice,
                &AudioAction::AudioSession(AudioSessionAction::SetCategoryAndMode(
                    AudioCategory::PlayAndRecord,
                    AudioMode::VoiceChat,
                )),
            )
            .unwrap();
        assert!(!state.stereo_configuration.playout.available);
        assert!(!state.stereo_configuration.playout.enabled);
        assert_eq!(module.stereo_playout_updates(), vec![true, false]);
    }

    #[test]
    fn test_not_enabled_without_preference() {
        let module = Arc::new(MockAudioDeviceModule::new());
        let mut state = state_with_module(module.clone());
        state.stereo_configuration.playout.preferred = false;
        state.current_route = stereo_route();

        let state = StereoReducer::new()
            .reduce(
                state,
                &AudioAction::AudioSession(AudioSessionAction::SetCategoryOptions(CategoryOptions::NONE)),
            )
            .unwrap();
        assert!(state.stereo_configuration.playout.available);
        assert!(!state.stereo_configuration.playout.enabled);
        assert!(module.stereo_playout_updates().is_empty());
    }
}
