//! Middleware of the audio store
//!
//! Middleware sees every action together with the state it is about to be
//! applied to, before the reducers run. It never mutates state directly; it
//! reacts by dispatching new actions, which queue behind the current one.

mod application_state;
mod category;
mod device_module;
mod recording;
mod session_observer;
mod should_record;

pub use application_state::ApplicationStateMiddleware;
pub use category::CategoryMiddleware;
pub use device_module::AudioDeviceModuleMiddleware;
pub use recording::RecordingMiddleware;
pub use session_observer::SessionObserverMiddleware;
pub use should_record::ShouldRecordMiddleware;

use tokio::sync::watch;

use crate::actions::AudioAction;
use crate::state::AudioStoreState;
use crate::store::Dispatcher;

/// What a middleware receives when the store starts
#[derive(Clone)]
pub struct MiddlewareContext {
    pub dispatcher: Dispatcher,
    pub state: watch::Receiver<AudioStoreState>,
}

pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start any observation the middleware owns
    fn attach(&self, _context: &MiddlewareContext) {}

    fn apply(&self, state: &AudioStoreState, action: &AudioAction, dispatcher: &Dispatcher);
}
