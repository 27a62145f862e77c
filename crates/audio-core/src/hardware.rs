//! Interfaces of the platform audio stack
//!
//! The audio store is the only writer of these collaborators: reducers call
//! into [`AudioSessionHardware`] and [`AudioDeviceModule`], middleware drives
//! the [`AudioRecorder`].

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::error::AudioResult;
use crate::session::{AudioCategory, AudioMode, AudioRoute, AudioSessionConfiguration, CategoryOptions, PortOverride};

/// Notifications raised by the platform audio session
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSessionNotification {
    InterruptionBegan,
    InterruptionEnded { should_resume: bool },
    RouteChanged { route: AudioRoute },
    /// Something outside the store changed the session configuration
    ConfigurationChanged {
        category: AudioCategory,
        mode: AudioMode,
        options: CategoryOptions,
    },
}

/// Whether the app is in the foreground
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationState {
    #[default]
    Foreground,
    Background,
}

/// The shared platform audio session
#[async_trait]
pub trait AudioSessionHardware: Send + Sync {
    fn is_active(&self) -> bool;

    fn set_active(&self, active: bool) -> AudioResult<()>;

    /// Options the session currently carries
    fn category_options(&self) -> CategoryOptions;

    fn set_configuration(&self, configuration: &AudioSessionConfiguration) -> AudioResult<()>;

    fn override_output_port(&self, port: PortOverride) -> AudioResult<()>;

    fn set_audio_enabled(&self, enabled: bool);

    fn set_use_manual_audio(&self, enabled: bool);

    fn set_prefers_no_interruptions_from_system_alerts(&self, value: bool) -> AudioResult<()>;

    /// CallKit handed over an activated session
    fn did_activate_callkit(&self);

    fn did_deactivate_callkit(&self);

    fn current_route(&self) -> AudioRoute;

    fn notifications(&self) -> broadcast::Receiver<AudioSessionNotification>;

    async fn request_record_permission(&self) -> AudioResult<bool>;
}

/// The WebRTC audio device module
pub trait AudioDeviceModule: Send + Sync {
    fn is_recording(&self) -> bool;

    fn set_recording(&self, recording: bool) -> AudioResult<()>;

    fn is_microphone_muted(&self) -> bool;

    fn set_muted(&self, muted: bool) -> AudioResult<()>;

    fn set_stereo_playout_enabled(&self, enabled: bool) -> AudioResult<()>;

    /// Current input level in dBFS
    fn audio_level(&self) -> f32;

    fn subscribe_recording(&self) -> watch::Receiver<bool>;

    fn subscribe_microphone_muted(&self) -> watch::Receiver<bool>;
}

impl fmt::Debug for dyn AudioDeviceModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioDeviceModule")
            .field("recording", &self.is_recording())
            .field("muted", &self.is_microphone_muted())
            .finish()
    }
}

/// Platform recorder used for metering while no device module records
pub trait AudioRecorder: Send + Sync {
    /// Start recording; `false` when the platform refused
    fn record(&self) -> AudioResult<bool>;

    fn stop(&self);

    /// Refresh and return the average power of channel 0 in dBFS
    fn average_power(&self) -> f32;
}
