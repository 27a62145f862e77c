use std::sync::Arc;

use tracing::debug;

use crate::actions::{AudioAction, CallKitAction};
use crate::error::AudioResult;
use crate::hardware::AudioSessionHardware;
use crate::reducers::Reducer;
use crate::state::AudioStoreState;

/// Mirrors CallKit activating or deactivating the session
pub struct CallKitReducer {
    hardware: Arc<dyn AudioSessionHardware>,
}

impl CallKitReducer {
    pub fn new(hardware: Arc<dyn AudioSessionHardware>) -> Self {
        Self { hardware }
    }
}

impl Reducer for CallKitReducer {
    fn name(&self) -> &'static str {
        "callkit"
    }

    fn reduce(&self, mut state: AudioStoreState, action: &AudioAction) -> AudioResult<AudioStoreState> {
        let AudioAction::CallKit(action) = action else {
            return Ok(state);
        };

        match action {
            CallKitAction::Activate => self.hardware.did_activate_callkit(),
            CallKitAction::Deactivate => self.hardware.did_deactivate_callkit(),
        }
        state.is_active = self.hardware.is_active();
        debug!(is_active = state.is_active, "CallKit {:?}", action);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HardwareCall, MockAudioSessionHardware};

    #[test]
    fn test_activation_is_forwarded_and_mirrored() {
        let hardware = Arc::new(MockAudioSessionHardware::new());
        let reducer = CallKitReducer::new(hardware.clone());

        let state = reducer
            .reduce(AudioStoreState::default(), &AudioAction::CallKit(CallKitAction::Activate))
            .unwrap();
        assert!(state.is_active);

        let state = reducer
            .reduce(state, &AudioAction::CallKit(CallKitAction::Deactivate))
            .unwrap();
        assert!(!state.is_active);
        assert_eq!(
            hardware.calls(),
            vec![HardwareCall::DidActivateCallKit, HardwareCall::DidDeactivateCallKit]
        );
    }

    #[test]
    fn test_other_actions_pass_through() {
        let hardware = Arc::new(MockAudioSessionHardware::new());
        let reducer = CallKitReducer::new(hardware.clone());
        let state = AudioStoreState::default();

        let next = reducer.reduce(state.clone(), &AudioAction::SetActive(true)).unwrap();
        assert_eq!(next, state);
        assert!(hardware.calls().is_empty());
    }
}
