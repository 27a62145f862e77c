use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};
use vidcall_infra_common::DisposableBag;

use crate::actions::AudioAction;
use crate::hardware::ApplicationState;
use crate::middleware::{Middleware, MiddlewareContext};
use crate::state::AudioStoreState;
use crate::store::Dispatcher;

/// Restarts recording when the app moves between foreground and background
///
/// The platform can leave the capture unit in a stale state across the
/// transition, so an ongoing recording is stopped and started again after a
/// short settle delay.
pub struct ApplicationStateMiddleware {
    application_state: Mutex<Option<watch::Receiver<ApplicationState>>>,
    settle_delay: Duration,
    bag: Arc<DisposableBag>,
}

impl ApplicationStateMiddleware {
    pub fn new(application_state: watch::Receiver<ApplicationState>, settle_delay: Duration) -> Self {
        Self {
            application_state: Mutex::new(Some(application_state)),
            settle_delay,
            bag: Arc::new(DisposableBag::new("application-state-middleware")),
        }
    }
}

impl Middleware for ApplicationStateMiddleware {
    fn name(&self) -> &'static str {
        "application_state"
    }

    fn attach(&self, context: &MiddlewareContext) {
        let Some(mut application_state) = self.application_state.lock().take() else {
            return;
        };
        let state = context.state.clone();
        let dispatcher = context.dispatcher.clone();
        let settle_delay = self.settle_delay;
        let bag = Arc::downgrade(&self.bag);

        self.bag.spawn_keyed("observe", async move {
            let mut last = *application_state.borrow_and_update();

            while application_state.changed().await.is_ok() {
                let current = *application_state.borrow_and_update();
                if current == last {
                    continue;
                }
                last = current;

                let recording = {
                    let state = state.borrow();
                    state.should_record && state.is_recording
                };
                if !recording {
                    debug!(?current, "Application state changed while not recording");
                    continue;
                }

                let Some(bag) = bag.upgrade() else {
                    break;
                };
                info!(?current, "Application state changed; restarting recording");
                let dispatcher = dispatcher.clone();
                bag.spawn_keyed("cycle", async move {
                    dispatcher.dispatch(AudioAction::SetShouldRecord(false));
                    tokio::time::sleep(settle_delay).await;
                    dispatcher.dispatch(AudioAction::SetShouldRecord(true));
                });
            }
        });
    }

    fn apply(&self, _state: &AudioStoreState, _action: &AudioAction, _dispatcher: &Dispatcher) {}
}
