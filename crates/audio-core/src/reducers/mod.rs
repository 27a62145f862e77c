//! Reducers of the audio store
//!
//! Each reducer handles one action family: it performs the matching hardware
//! call and returns the next state. A reducer that fails leaves both state
//! and hardware as they were; the store discards the whole action.

mod audio_session;
mod callkit;
mod default;
mod stereo;
mod webrtc;

use std::sync::Arc;

pub use audio_session::AudioSessionReducer;
pub use callkit::CallKitReducer;
pub use default::DefaultReducer;
pub use stereo::StereoReducer;
pub use webrtc::WebRtcAudioSessionReducer;

use crate::actions::AudioAction;
use crate::error::AudioResult;
use crate::hardware::AudioSessionHardware;
use crate::session::WebRtcAudioDefaults;
use crate::state::AudioStoreState;

/// One step of the reducer chain
pub trait Reducer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return the next state; actions of other families pass `state` through
    fn reduce(&self, state: AudioStoreState, action: &AudioAction) -> AudioResult<AudioStoreState>;
}

/// The standard chain, in order
pub fn standard_reducers(
    hardware: Arc<dyn AudioSessionHardware>,
    defaults: WebRtcAudioDefaults,
) -> Vec<Arc<dyn Reducer>> {
    vec![
        Arc::new(DefaultReducer::new(hardware.clone())),
        Arc::new(AudioSessionReducer::new(hardware.clone(), defaults)),
        Arc::new(WebRtcAudioSessionReducer::new(hardware.clone())),
        Arc::new(CallKitReducer::new(hardware)),
        Arc::new(StereoReducer::new()),
    ]
}
