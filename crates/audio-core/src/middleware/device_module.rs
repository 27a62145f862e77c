use std::sync::Arc;

use futures::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};
use vidcall_infra_common::DisposableBag;

use crate::actions::AudioAction;
use crate::hardware::AudioDeviceModule;
use crate::middleware::Middleware;
use crate::state::AudioStoreState;
use crate::store::Dispatcher;

/// Drives the audio device module from store actions
///
/// Interruptions stop and restart module recording, should-record toggles
/// it, and mute is applied only while recording is wanted. When the module
/// is swapped, the old one stops and the new one's recording and mute
/// publishers are mirrored back into the store.
pub struct AudioDeviceModuleMiddleware {
    bag: DisposableBag,
}

impl AudioDeviceModuleMiddleware {
    pub fn new() -> Self {
        Self {
            bag: DisposableBag::new("audio-device-module-middleware"),
        }
    }

    fn did_set_interrupted(&self, interrupted: bool, state: &AudioStoreState, module: &dyn AudioDeviceModule) {
        if !state.is_active || !state.should_record {
            return;
        }

        let result = if interrupted {
            module.set_recording(false)
        } else {
            module.set_recording(false).and_then(|_| module.set_recording(true))
        };
        if let Err(e) = result {
            warn!(error = %e, interrupted, "Unable to update device module recording");
        }
    }

    fn did_set_should_record(&self, should_record: bool, module: &dyn AudioDeviceModule) {
        if module.is_recording() == should_record {
            return;
        }
        if let Err(e) = module.set_recording(should_record) {
            warn!(error = %e, should_record, "Unable to update device module recording");
        }
    }

    fn did_set_microphone_muted(&self, muted: bool, state: &AudioStoreState, module: &dyn AudioDeviceModule) {
        if !state.should_record {
            return;
        }
        if let Err(e) = module.set_muted(muted) {
            warn!(error = %e, muted, "Unable to update device module mute");
        }
    }

    fn did_set_module(
        &self,
        module: &Option<Arc<dyn AudioDeviceModule>>,
        state: &AudioStoreState,
        dispatcher: &Dispatcher,
    ) {
        if let Some(previous) = &state.audio_device_module {
            if let Err(e) = previous.set_recording(false) {
                warn!(error = %e, "Unable to stop the previous device module");
            }
        }

        self.bag.cancel_all();

        let Some(module) = module else {
            return;
        };

        let mut recording = WatchStream::new(module.subscribe_recording());
        let recording_dispatcher = dispatcher.clone();
        self.bag.spawn_keyed("recording", async move {
            while let Some(value) = recording.next().await {
                recording_dispatcher.dispatch(AudioAction::SetRecording(value));
            }
        });

        let mut muted = WatchStream::new(module.subscribe_microphone_muted());
        let muted_dispatcher = dispatcher.clone();
        self.bag.spawn_keyed("muted", async move {
            while let Some(value) = muted.next().await {
                debug!(muted = value, "Device module reported microphone mute");
                muted_dispatcher.dispatch(AudioAction::SetMicrophoneMuted(value));
            }
        });
    }
}

impl Default for AudioDeviceModuleMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for AudioDeviceModuleMiddleware {
    fn name(&self) -> &'static str {
        "audio_device_module"
    }

    fn apply(&self, state: &AudioStoreState, action: &AudioAction, dispatcher: &Dispatcher) {
        if let AudioAction::SetAudioDeviceModule(module) = action {
            self.did_set_module(module, state, dispatcher);
            return;
        }

        let Some(module) = state.audio_device_module.as_deref() else {
            return;
        };

        match action {
            AudioAction::SetInterrupted(value) => self.did_set_interrupted(*value, state, module),
            AudioAction::SetShouldRecord(value) => self.did_set_should_record(*value, module),
            AudioAction::SetMicrophoneMuted(value) => self.did_set_microphone_muted(*value, state, module),
            _ => {}
        }
    }
}
