use tracing::info;
use vidcall_infra_common::DisposableBag;

use crate::actions::AudioAction;
use crate::middleware::{Middleware, MiddlewareContext};
use crate::state::AudioStoreState;
use crate::store::Dispatcher;

/// Stops recording when the session moves to a category that cannot record
pub struct CategoryMiddleware {
    bag: DisposableBag,
}

impl CategoryMiddleware {
    pub fn new() -> Self {
        Self {
            bag: DisposableBag::new("category-middleware"),
        }
    }
}

impl Default for CategoryMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for CategoryMiddleware {
    fn name(&self) -> &'static str {
        "category"
    }

    fn attach(&self, context: &MiddlewareContext) {
        let mut state = context.state.clone();
        let dispatcher = context.dispatcher.clone();

        self.bag.spawn_keyed("category", async move {
            let mut last_category = state.borrow_and_update().audio_session_configuration.category;

            while state.changed().await.is_ok() {
                let (category, wants_recording) = {
                    let current = state.borrow_and_update();
                    (
                        current.audio_session_configuration.category,
                        current.should_record || current.is_recording,
                    )
                };
                if category == last_category {
                    continue;
                }
                last_category = category;

                if !category.allows_recording() && wants_recording {
                    info!(%category, "Category cannot record; stopping recording");
                    dispatcher.dispatch(AudioAction::SetShouldRecord(false));
                }
            }
        });
    }

    fn apply(&self, _state: &AudioStoreState, _action: &AudioAction, _dispatcher: &Dispatcher) {}
}
