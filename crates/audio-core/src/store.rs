//! Single-writer audio store
//!
//! All mutation of the audio session goes through one dispatch loop:
//!
//! 1. redundant actions (the state already holds the value) are skipped
//! 2. every middleware sees the action and the state before it
//! 3. the reducers fold the action into the next state, performing their
//!    hardware calls on the way
//! 4. the new state is published
//!
//! A reducer error discards the whole action and leaves the published state
//! untouched.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info};
use vidcall_infra_common::DisposableBag;
use vidcall_signal_core::CallSettings;

use crate::actions::{AudioAction, AudioSessionAction, WebRtcAudioAction};
use crate::error::{AudioError, AudioResult};
use crate::hardware::{ApplicationState, AudioRecorder, AudioSessionHardware};
use crate::middleware::{
    ApplicationStateMiddleware, AudioDeviceModuleMiddleware, CategoryMiddleware, Middleware, MiddlewareContext,
    RecordingMiddleware, SessionObserverMiddleware, ShouldRecordMiddleware,
};
use crate::permissions::PermissionStore;
use crate::policy::CallAudioPolicy;
use crate::reducers::{Reducer, standard_reducers};
use crate::session::WebRtcAudioDefaults;
use crate::state::AudioStoreState;

/// Audio store timing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStoreConfig {
    /// Quiet period before should-record follows its inputs
    pub should_record_debounce: Duration,
    /// Pause between stopping and restarting recording on app state changes
    pub app_state_settle_delay: Duration,
    /// Quiet period before the session restarts after an interruption
    pub interruption_restart_debounce: Duration,
    /// Interval between meter updates while recording
    pub metering_interval: Duration,
}

impl Default for AudioStoreConfig {
    fn default() -> Self {
        Self {
            should_record_debounce: Duration::from_millis(500),
            app_state_settle_delay: Duration::from_millis(250),
            interruption_restart_debounce: Duration::from_secs(1),
            metering_interval: Duration::from_millis(100),
        }
    }
}

struct Envelope {
    action: AudioAction,
    reply: Option<oneshot::Sender<AudioResult<()>>>,
}

/// Handle for sending actions into the store
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Dispatcher {
    /// Queue an action without waiting for it
    pub fn dispatch(&self, action: AudioAction) {
        if let Err(e) = self.tx.send(Envelope { action, reply: None }) {
            debug!(action = %e.0.action, "Audio store closed; dropping action");
        }
    }

    /// Queue several actions in order
    pub fn dispatch_all(&self, actions: impl IntoIterator<Item = AudioAction>) {
        for action in actions {
            self.dispatch(action);
        }
    }

    /// Queue an action and wait until the store has processed it
    pub async fn execute(&self, action: AudioAction) -> AudioResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                action,
                reply: Some(reply_tx),
            })
            .map_err(|_| AudioError::StoreClosed)?;
        reply_rx.await.map_err(|_| AudioError::StoreClosed)?
    }
}

/// Builder for [`AudioStore`]
pub struct AudioStoreBuilder {
    hardware: Arc<dyn AudioSessionHardware>,
    defaults: WebRtcAudioDefaults,
    config: AudioStoreConfig,
    recorder: Option<Arc<dyn AudioRecorder>>,
    application_state: Option<watch::Receiver<ApplicationState>>,
    reducers: Vec<Arc<dyn Reducer>>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl AudioStoreBuilder {
    pub fn defaults(mut self, defaults: WebRtcAudioDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn config(mut self, config: AudioStoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Platform recorder used for metering when no device module records
    pub fn recorder(mut self, recorder: Arc<dyn AudioRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn application_state(mut self, state: watch::Receiver<ApplicationState>) -> Self {
        self.application_state = Some(state);
        self
    }

    /// Append a reducer after the standard chain
    pub fn reducer(mut self, reducer: Arc<dyn Reducer>) -> Self {
        self.reducers.push(reducer);
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Start the dispatch loop; must run inside a tokio runtime
    pub fn build(self) -> AudioStore {
        let initial = AudioStoreState::initial(self.defaults.get(), self.hardware.current_route());
        let (state_tx, state_rx) = watch::channel(initial);
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher { tx: action_tx };

        let mut reducers = standard_reducers(self.hardware.clone(), self.defaults.clone());
        reducers.extend(self.reducers);

        let should_record = Arc::new(ShouldRecordMiddleware::new(self.config.should_record_debounce));
        let recording = self.recorder.map(|recorder| {
            Arc::new(RecordingMiddleware::new(
                recorder,
                self.hardware.clone(),
                self.config.metering_interval,
            ))
        });

        let mut middleware: Vec<Arc<dyn Middleware>> = Vec::new();
        middleware.push(Arc::new(AudioDeviceModuleMiddleware::new()));
        middleware.push(Arc::new(CategoryMiddleware::new()));
        middleware.push(Arc::new(SessionObserverMiddleware::new(
            self.hardware.clone(),
            self.config.interruption_restart_debounce,
        )));
        middleware.push(should_record.clone());
        if let Some(recording) = &recording {
            middleware.push(recording.clone());
        }
        if let Some(application_state) = self.application_state {
            middleware.push(Arc::new(ApplicationStateMiddleware::new(
                application_state,
                self.config.app_state_settle_delay,
            )));
        }
        middleware.extend(self.middleware);

        let context = MiddlewareContext {
            dispatcher: dispatcher.clone(),
            state: state_rx.clone(),
        };
        for m in &middleware {
            m.attach(&context);
        }

        let bag = DisposableBag::new("audio-store");
        bag.spawn_keyed(
            "dispatch",
            run_dispatch_loop(action_rx, state_tx, reducers, middleware, dispatcher.clone()),
        );

        info!("Audio store started");

        AudioStore {
            permissions: PermissionStore::new(self.hardware.clone(), dispatcher.clone()),
            dispatcher,
            state_rx,
            should_record,
            recording,
            bag,
        }
    }
}

/// The audio session store
pub struct AudioStore {
    dispatcher: Dispatcher,
    state_rx: watch::Receiver<AudioStoreState>,
    permissions: PermissionStore,
    should_record: Arc<ShouldRecordMiddleware>,
    recording: Option<Arc<RecordingMiddleware>>,
    bag: DisposableBag,
}

impl AudioStore {
    pub fn builder(hardware: Arc<dyn AudioSessionHardware>) -> AudioStoreBuilder {
        AudioStoreBuilder {
            hardware,
            defaults: WebRtcAudioDefaults::default(),
            config: AudioStoreConfig::default(),
            recorder: None,
            application_state: None,
            reducers: Vec::new(),
            middleware: Vec::new(),
        }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> AudioStoreState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AudioStoreState> {
        self.state_rx.clone()
    }

    pub fn state_stream(&self) -> WatchStream<AudioStoreState> {
        WatchStream::new(self.state_rx.clone())
    }

    /// Observe one slice of the state; only changes of the slice are published
    pub fn slice<T, F>(&self, name: &str, select: F) -> watch::Receiver<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&AudioStoreState) -> T + Send + 'static,
    {
        let mut state_rx = self.state_rx.clone();
        let (tx, rx) = watch::channel(select(&state_rx.borrow_and_update()));

        self.bag.spawn_keyed(format!("slice-{}", name), async move {
            while state_rx.changed().await.is_ok() {
                let value = select(&state_rx.borrow_and_update());
                tx.send_if_modified(|current| {
                    if *current != value {
                        *current = value;
                        true
                    } else {
                        false
                    }
                });
                if tx.is_closed() {
                    break;
                }
            }
        });
        rx
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    pub fn dispatch(&self, action: AudioAction) {
        self.dispatcher.dispatch(action);
    }

    pub async fn execute(&self, action: AudioAction) -> AudioResult<()> {
        self.dispatcher.execute(action).await
    }

    /// Ask for microphone permission and record the answer
    pub async fn request_record_permission(&self) -> AudioResult<bool> {
        self.permissions.request_microphone_permission().await
    }

    /// Scope the should-record policy to a call; `None` when the call ends
    pub fn set_active_call(&self, audio_on: Option<watch::Receiver<bool>>) {
        self.should_record.set_active_call(audio_on);
    }

    /// Meter levels while recording through the platform recorder
    pub fn subscribe_meter(&self) -> Option<watch::Receiver<f32>> {
        self.recording.as_ref().map(|r| r.subscribe_meter())
    }

    /// Enable WebRTC audio and apply the configuration for `settings`
    pub async fn activate(&self, settings: &CallSettings) -> AudioResult<()> {
        self.execute(AudioAction::WebRtc(WebRtcAudioAction::SetAudioEnabled(true)))
            .await?;
        self.did_update_call_settings(settings).await?;
        self.execute(AudioAction::SetActive(true)).await
    }

    pub async fn deactivate(&self) -> AudioResult<()> {
        self.set_active_call(None);
        self.execute(AudioAction::WebRtc(WebRtcAudioAction::SetAudioEnabled(false)))
            .await?;
        self.execute(AudioAction::SetActive(false)).await
    }

    /// Reconcile the session with new call settings
    pub async fn did_update_call_settings(&self, settings: &CallSettings) -> AudioResult<()> {
        let target = CallAudioPolicy::configuration(settings);
        self.execute(AudioAction::AudioSession(AudioSessionAction::SetCategoryModeAndOptions(
            target.category,
            target.mode,
            target.options,
        )))
        .await?;
        self.execute(AudioAction::AudioSession(AudioSessionAction::SetOverrideOutputPort(
            target.override_output_port,
        )))
        .await?;
        self.dispatch(AudioAction::SetMicrophoneMuted(!settings.audio_on));
        Ok(())
    }

    /// Stop the dispatch loop and every observation
    pub fn close(&self) {
        self.bag.cancel_all();
    }
}

async fn run_dispatch_loop(
    mut action_rx: mpsc::UnboundedReceiver<Envelope>,
    state_tx: watch::Sender<AudioStoreState>,
    reducers: Vec<Arc<dyn Reducer>>,
    middleware: Vec<Arc<dyn Middleware>>,
    dispatcher: Dispatcher,
) {
    while let Some(Envelope { action, reply }) = action_rx.recv().await {
        let result = process(&action, &state_tx, &reducers, &middleware, &dispatcher);
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }
    debug!("Audio store dispatch loop ended");
}

fn process(
    action: &AudioAction,
    state_tx: &watch::Sender<AudioStoreState>,
    reducers: &[Arc<dyn Reducer>],
    middleware: &[Arc<dyn Middleware>],
    dispatcher: &Dispatcher,
) -> AudioResult<()> {
    let state = state_tx.borrow().clone();

    if action.is_redundant(&state) {
        debug!(%action, "Skipping audio action; state already matches");
        return Ok(());
    }

    for m in middleware {
        m.apply(&state, action, dispatcher);
    }

    let mut next = state;
    for reducer in reducers {
        next = match reducer.reduce(next, action) {
            Ok(state) => state,
            Err(e) => {
                error!(%action, reducer = reducer.name(), error = %e, "Audio action failed");
                return Err(e);
            }
        };
    }

    debug!(%action, "Audio action completed");
    state_tx.send_if_modified(|current| {
        if *current != next {
            *current = next;
            true
        } else {
            false
        }
    });
    Ok(())
}
