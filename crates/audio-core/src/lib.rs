//! Audio session store for vidcall
//!
//! The platform audio session is a process-wide singleton. Every change to it
//! goes through an [`AudioStore`], which runs actions through middleware and
//! a fixed chain of reducers on a single dispatch loop and publishes the
//! resulting [`AudioStoreState`].
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use vidcall_audio_core::prelude::*;
//! # async fn example(hardware: Arc<dyn AudioSessionHardware>) -> AudioResult<()> {
//! let store = AudioStore::builder(hardware).build();
//! store.execute(AudioAction::SetActive(true)).await?;
//! assert!(store.state().is_active);
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod error;
pub mod hardware;
pub mod middleware;
pub mod permissions;
pub mod policy;
pub mod reducers;
pub mod session;
pub mod state;
pub mod store;
pub mod validator;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use actions::{AudioAction, AudioSessionAction, CallKitAction, WebRtcAudioAction};
pub use error::{AudioError, AudioResult};
pub use hardware::{
    ApplicationState, AudioDeviceModule, AudioRecorder, AudioSessionHardware, AudioSessionNotification,
};
pub use middleware::{Middleware, MiddlewareContext};
pub use permissions::PermissionStore;
pub use policy::CallAudioPolicy;
pub use reducers::Reducer;
pub use session::{
    AudioCategory, AudioMode, AudioPort, AudioRoute, AudioSessionConfiguration, CategoryOptions, PortOverride,
    PortType, StereoConfiguration, StereoPlayout, WebRtcAudioDefaults, WebRtcAudioSessionConfiguration,
};
pub use state::AudioStoreState;
pub use store::{AudioStore, AudioStoreBuilder, AudioStoreConfig, Dispatcher};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::actions::{AudioAction, AudioSessionAction, WebRtcAudioAction};
    pub use crate::error::{AudioError, AudioResult};
    pub use crate::hardware::{AudioDeviceModule, AudioSessionHardware};
    pub use crate::session::{AudioCategory, AudioMode, AudioSessionConfiguration, CategoryOptions};
    pub use crate::state::AudioStoreState;
    pub use crate::store::{AudioStore, AudioStoreConfig};
}
