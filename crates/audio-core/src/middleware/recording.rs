use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use vidcall_infra_common::DisposableBag;

use crate::actions::AudioAction;
use crate::hardware::{AudioDeviceModule, AudioRecorder, AudioSessionHardware};
use crate::middleware::{Middleware, MiddlewareContext};
use crate::permissions::PermissionStore;
use crate::state::AudioStoreState;
use crate::store::Dispatcher;

/// Level reported while nothing is being metered
pub const SILENCE_DB: f32 = -160.0;

const METER_KEY: &str = "meter";

enum RecordingCommand {
    Start { module: Option<Arc<dyn AudioDeviceModule>> },
    Stop,
}

/// Source of meter levels
#[derive(Clone)]
enum MeterSource {
    Module(Arc<dyn AudioDeviceModule>),
    Recorder(Arc<dyn AudioRecorder>),
}

impl MeterSource {
    fn level(&self) -> f32 {
        match self {
            Self::Module(module) => module.audio_level(),
            Self::Recorder(recorder) => recorder.average_power(),
        }
    }
}

/// Publishes microphone levels while recording is wanted
///
/// With a device module the levels come from the module. Without one the
/// platform recorder is started, after asking for permission when the store
/// does not hold it yet. Start and stop requests are handled one at a time
/// in the order they were made.
pub struct RecordingMiddleware {
    recorder: Arc<dyn AudioRecorder>,
    hardware: Arc<dyn AudioSessionHardware>,
    metering_interval: Duration,
    meter: watch::Sender<f32>,
    commands: mpsc::UnboundedSender<RecordingCommand>,
    pending: Mutex<Option<mpsc::UnboundedReceiver<RecordingCommand>>>,
    bag: Arc<DisposableBag>,
}

impl RecordingMiddleware {
    pub fn new(
        recorder: Arc<dyn AudioRecorder>,
        hardware: Arc<dyn AudioSessionHardware>,
        metering_interval: Duration,
    ) -> Self {
        let (commands, pending) = mpsc::unbounded_channel();
        let (meter, _) = watch::channel(SILENCE_DB);
        Self {
            recorder,
            hardware,
            metering_interval,
            meter,
            commands,
            pending: Mutex::new(Some(pending)),
            bag: Arc::new(DisposableBag::new("recording-middleware")),
        }
    }

    pub fn subscribe_meter(&self) -> watch::Receiver<f32> {
        self.meter.subscribe()
    }

    fn send(&self, command: RecordingCommand) {
        if self.commands.send(command).is_err() {
            debug!("Recording worker stopped; dropping command");
        }
    }
}

struct RecordingWorker {
    recorder: Arc<dyn AudioRecorder>,
    permissions: PermissionStore,
    state: watch::Receiver<AudioStoreState>,
    dispatcher: Dispatcher,
    meter: watch::Sender<f32>,
    metering_interval: Duration,
    bag: Arc<DisposableBag>,
    recorder_running: bool,
}

impl RecordingWorker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<RecordingCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                RecordingCommand::Start { module } => self.start(module).await,
                RecordingCommand::Stop => self.stop(),
            }
        }
    }

    async fn start(&mut self, module: Option<Arc<dyn AudioDeviceModule>>) {
        if let Some(module) = module {
            debug!("Metering through the audio device module");
            self.start_metering(MeterSource::Module(module));
            return;
        }

        if self.recorder_running {
            return;
        }

        let has_permission = self.state.borrow().has_recording_permission;
        if !has_permission {
            match self.permissions.request_microphone_permission().await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Recording permission denied; not starting recorder");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Unable to request recording permission");
                    return;
                }
            }
        }

        match self.recorder.record() {
            Ok(true) => {
                info!("Recorder started");
                self.recorder_running = true;
                self.dispatcher.dispatch(AudioAction::SetRecording(true));
                self.start_metering(MeterSource::Recorder(self.recorder.clone()));
            }
            Ok(false) => warn!("Recorder refused to start"),
            Err(e) => warn!(error = %e, "Unable to start recorder"),
        }
    }

    fn stop(&mut self) {
        self.bag.remove(METER_KEY);
        self.meter.send_replace(SILENCE_DB);

        if self.recorder_running {
            self.recorder.stop();
            self.recorder_running = false;
            info!("Recorder stopped");
            self.dispatcher.dispatch(AudioAction::SetRecording(false));
        }
    }

    fn start_metering(&self, source: MeterSource) {
        let meter = self.meter.clone();
        let period = self.metering_interval;

        self.bag.spawn_keyed(METER_KEY, async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                meter.send_replace(source.level());
            }
        });
    }
}

impl Middleware for RecordingMiddleware {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn attach(&self, context: &MiddlewareContext) {
        let Some(commands) = self.pending.lock().take() else {
            return;
        };

        let worker = RecordingWorker {
            recorder: self.recorder.clone(),
            permissions: PermissionStore::new(self.hardware.clone(), context.dispatcher.clone()),
            state: context.state.clone(),
            dispatcher: context.dispatcher.clone(),
            meter: self.meter.clone(),
            metering_interval: self.metering_interval,
            bag: self.bag.clone(),
            recorder_running: false,
        };
        self.bag.spawn_keyed("worker", worker.run(commands));
    }

    fn apply(&self, state: &AudioStoreState, action: &AudioAction, _dispatcher: &Dispatcher) {
        match action {
            AudioAction::SetShouldRecord(true) => self.send(RecordingCommand::Start {
                module: state.audio_device_module.clone(),
            }),
            AudioAction::SetShouldRecord(false) => self.send(RecordingCommand::Stop),
            AudioAction::SetInterrupted(true) if state.should_record => self.send(RecordingCommand::Stop),
            AudioAction::SetInterrupted(false) if state.should_record => self.send(RecordingCommand::Start {
                module: state.audio_device_module.clone(),
            }),
            _ => {}
        }
    }
}
