use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use vidcall_infra_common::DisposableBag;

use crate::actions::{AudioAction, AudioSessionAction, WebRtcAudioAction};
use crate::hardware::{AudioSessionHardware, AudioSessionNotification};
use crate::middleware::{Middleware, MiddlewareContext};
use crate::state::AudioStoreState;
use crate::store::Dispatcher;

const RESTART_KEY: &str = "restart";

/// Mirrors platform session notifications into the store
///
/// Interruptions toggle `is_interrupted`; once one ends the session is
/// restarted after a quiet period. Route and configuration changes made
/// outside the store are mirrored back into it. Granting microphone
/// permission for the first time also restarts the session so recording
/// picks up the new permission.
pub struct SessionObserverMiddleware {
    hardware: Arc<dyn AudioSessionHardware>,
    restart_debounce: Duration,
    bag: Arc<DisposableBag>,
}

impl SessionObserverMiddleware {
    pub fn new(hardware: Arc<dyn AudioSessionHardware>, restart_debounce: Duration) -> Self {
        Self {
            hardware,
            restart_debounce,
            bag: Arc::new(DisposableBag::new("session-observer-middleware")),
        }
    }
}

/// Schedule a session restart, replacing any restart still waiting
fn schedule_restart(
    bag: &Weak<DisposableBag>,
    debounce: Duration,
    state: watch::Receiver<AudioStoreState>,
    dispatcher: Dispatcher,
) {
    let Some(bag) = bag.upgrade() else {
        return;
    };

    bag.spawn_keyed(RESTART_KEY, async move {
        tokio::time::sleep(debounce).await;

        if !state.borrow().is_active {
            debug!("Session inactive; skipping restart");
            return;
        }

        info!("Restarting audio session");
        dispatcher.dispatch_all([
            AudioAction::WebRtc(WebRtcAudioAction::SetAudioEnabled(false)),
            AudioAction::SetActive(false),
            AudioAction::SetActive(true),
            AudioAction::WebRtc(WebRtcAudioAction::SetAudioEnabled(true)),
        ]);
    });
}

async fn observe_notifications(
    mut notifications: broadcast::Receiver<AudioSessionNotification>,
    state: watch::Receiver<AudioStoreState>,
    dispatcher: Dispatcher,
    bag: Weak<DisposableBag>,
    restart_debounce: Duration,
) {
    loop {
        let notification = match notifications.recv().await {
            Ok(notification) => notification,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Audio session notifications lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match notification {
            AudioSessionNotification::InterruptionBegan => {
                info!("Audio session interrupted");
                dispatcher.dispatch(AudioAction::SetInterrupted(true));
            }
            AudioSessionNotification::InterruptionEnded { should_resume } => {
                if !state.borrow().has_recording_permission {
                    debug!("Interruption ended without recording permission; ignoring");
                    continue;
                }
                info!(should_resume, "Audio session interruption ended");
                dispatcher.dispatch(AudioAction::SetInterrupted(false));
                schedule_restart(&bag, restart_debounce, state.clone(), dispatcher.clone());
            }
            AudioSessionNotification::RouteChanged { route } => {
                debug!(?route, "Audio route changed");
                dispatcher.dispatch(AudioAction::SetCurrentRoute(route));
            }
            AudioSessionNotification::ConfigurationChanged {
                category,
                mode,
                options,
            } => {
                dispatcher.dispatch(AudioAction::AudioSession(AudioSessionAction::SystemDidChange(
                    category, mode, options,
                )));
            }
        }
    }
    debug!("Audio session notification stream closed");
}

async fn observe_permission(
    mut state: watch::Receiver<AudioStoreState>,
    dispatcher: Dispatcher,
    bag: Weak<DisposableBag>,
    restart_debounce: Duration,
) {
    if state.borrow_and_update().has_recording_permission {
        return;
    }

    while state.changed().await.is_ok() {
        if state.borrow_and_update().has_recording_permission {
            info!("Recording permission granted; restarting session");
            schedule_restart(&bag, restart_debounce, state.clone(), dispatcher);
            return;
        }
    }
}

impl Middleware for SessionObserverMiddleware {
    fn name(&self) -> &'static str {
        "session_observer"
    }

    fn attach(&self, context: &MiddlewareContext) {
        let weak = Arc::downgrade(&self.bag);

        self.bag.spawn_keyed(
            "notifications",
            observe_notifications(
                self.hardware.notifications(),
                context.state.clone(),
                context.dispatcher.clone(),
                weak.clone(),
                self.restart_debounce,
            ),
        );

        self.bag.spawn_keyed(
            "permission",
            observe_permission(
                context.state.clone(),
                context.dispatcher.clone(),
                weak,
                self.restart_debounce,
            ),
        );
    }

    fn apply(&self, _state: &AudioStoreState, _action: &AudioAction, _dispatcher: &Dispatcher) {}
}
