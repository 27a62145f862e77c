//! Microphone permission requests

use std::sync::Arc;

use tracing::{info, warn};

use crate::actions::AudioAction;
use crate::error::AudioResult;
use crate::hardware::AudioSessionHardware;
use crate::store::Dispatcher;

/// Requests microphone permission and records the answer in the store
#[derive(Clone)]
pub struct PermissionStore {
    hardware: Arc<dyn AudioSessionHardware>,
    dispatcher: Dispatcher,
}

impl PermissionStore {
    pub fn new(hardware: Arc<dyn AudioSessionHardware>, dispatcher: Dispatcher) -> Self {
        Self { hardware, dispatcher }
    }

    pub async fn request_microphone_permission(&self) -> AudioResult<bool> {
        let granted = match self.hardware.request_record_permission().await {
            Ok(granted) => granted,
            Err(e) => {
                warn!(error = %e, "Microphone permission request failed");
                self.dispatcher.dispatch(AudioAction::SetHasRecordingPermission(false));
                return Err(e);
            }
        };

        info!(granted, "Microphone permission resolved");
        self.dispatcher
            .dispatch(AudioAction::SetHasRecordingPermission(granted));
        Ok(granted)
    }
}
