use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};
use vidcall_infra_common::DisposableBag;

use crate::actions::AudioAction;
use crate::middleware::{Middleware, MiddlewareContext};
use crate::state::AudioStoreState;
use crate::store::Dispatcher;

const CALL_KEY: &str = "active-call";

/// Keeps `should_record` in step with the active call
///
/// Recording is wanted while the call's microphone is on, the session is
/// active and recording permission is granted. Changes are debounced so
/// quick mute toggles do not restart recording. Leaving the call turns
/// recording off.
pub struct ShouldRecordMiddleware {
    debounce: Duration,
    context: Mutex<Option<MiddlewareContext>>,
    observing: Arc<AtomicBool>,
    bag: DisposableBag,
}

impl ShouldRecordMiddleware {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            context: Mutex::new(None),
            observing: Arc::new(AtomicBool::new(false)),
            bag: DisposableBag::new("should-record-middleware"),
        }
    }

    /// Follow `audio_on` of a call, or stop following with `None`
    pub fn set_active_call(&self, audio_on: Option<watch::Receiver<bool>>) {
        let Some(context) = self.context.lock().clone() else {
            warn!("Should-record middleware used before the store started");
            return;
        };

        let was_observing = self.observing.swap(audio_on.is_some(), Ordering::SeqCst);
        self.bag.remove(CALL_KEY);

        match audio_on {
            Some(audio_on) => {
                debug!("Following active call microphone setting");
                self.bag.spawn_keyed(
                    CALL_KEY,
                    follow_call(audio_on, context.state, self.debounce, context.dispatcher),
                );
            }
            None if was_observing => {
                debug!("Active call ended; recording no longer wanted");
                context.dispatcher.dispatch(AudioAction::SetShouldRecord(false));
            }
            None => {}
        }
    }
}

fn wants_recording(audio_on: bool, state: &AudioStoreState) -> bool {
    audio_on && state.is_active && state.has_recording_permission
}

async fn follow_call(
    mut audio_on: watch::Receiver<bool>,
    mut state: watch::Receiver<AudioStoreState>,
    debounce: Duration,
    dispatcher: Dispatcher,
) {
    let mut wanted = wants_recording(*audio_on.borrow_and_update(), &state.borrow_and_update());
    let mut pending = Some(wanted);
    let mut last_sent: Option<bool> = None;
    let quiet = tokio::time::sleep(debounce);
    tokio::pin!(quiet);

    loop {
        tokio::select! {
            changed = audio_on.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut quiet, if pending.is_some() => {
                if let Some(value) = pending.take() {
                    if last_sent != Some(value) {
                        last_sent = Some(value);
                        dispatcher.dispatch(AudioAction::SetShouldRecord(value));
                    }
                }
                continue;
            }
        }

        let next = wants_recording(*audio_on.borrow_and_update(), &state.borrow_and_update());
        if next != wanted {
            wanted = next;
            pending = Some(next);
            quiet.as_mut().reset(Instant::now() + debounce);
        }
    }
}

impl Middleware for ShouldRecordMiddleware {
    fn name(&self) -> &'static str {
        "should_record"
    }

    fn attach(&self, context: &MiddlewareContext) {
        *self.context.lock() = Some(context.clone());
    }

    fn apply(&self, _state: &AudioStoreState, _action: &AudioAction, _dispatcher: &Dispatcher) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AudioStore, AudioStoreConfig};
    use crate::testing::MockAudioSessionHardware;

    fn store() -> AudioStore {
        AudioStore::builder(Arc::new(MockAudioSessionHardware::new()))
            .config(AudioStoreConfig {
                should_record_debounce: Duration::from_millis(50),
                ..AudioStoreConfig::default()
            })
            .build()
    }

    /// Store with an active session and granted permission
    async fn recording_store() -> AudioStore {
        let store = store();
        store.execute(AudioAction::SetActive(true)).await.unwrap();
        store
            .execute(AudioAction::SetHasRecordingPermission(true))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_should_record_follows_audio_on_after_quiet_period() {
        let store = recording_store().await;
        let (audio_on, rx) = watch::channel(true);

        store.set_active_call(Some(rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!store.state().should_record);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.state().should_record);

        audio_on.send(false).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!store.state().should_record);
    }

    #[tokio::test]
    async fn test_inactive_session_does_not_record() {
        let store = store();
        store
            .execute(AudioAction::SetHasRecordingPermission(true))
            .await
            .unwrap();
        let (_audio_on, rx) = watch::channel(true);

        store.set_active_call(Some(rx));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!store.state().should_record);

        store.execute(AudioAction::SetActive(true)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.state().should_record);
    }

    #[tokio::test]
    async fn test_missing_permission_does_not_record() {
        let store = store();
        store.execute(AudioAction::SetActive(true)).await.unwrap();
        let (_audio_on, rx) = watch::channel(true);

        store.set_active_call(Some(rx));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!store.state().should_record);

        store
            .execute(AudioAction::SetHasRecordingPermission(true))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.state().should_record);
    }

    #[tokio::test]
    async fn test_quick_toggles_collapse() {
        let store = recording_store().await;
        let (audio_on, rx) = watch::channel(false);
        store.set_active_call(Some(rx));

        for value in [true, false, true, false, true] {
            audio_on.send(value).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(store.state().should_record);
    }

    #[tokio::test]
    async fn test_leaving_call_stops_recording() {
        let store = recording_store().await;
        let (_audio_on, rx) = watch::channel(true);
        store.set_active_call(Some(rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.state().should_record);

        store.set_active_call(None);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!store.state().should_record);
    }
}
