//! In-memory doubles of the platform audio stack

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use crate::error::{AudioError, AudioResult};
use crate::hardware::{AudioDeviceModule, AudioRecorder, AudioSessionHardware, AudioSessionNotification};
use crate::session::{AudioRoute, AudioSessionConfiguration, CategoryOptions, PortOverride};

/// Side effects recorded by [`MockAudioSessionHardware`]
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareCall {
    SetActive(bool),
    SetConfiguration(AudioSessionConfiguration),
    OverrideOutputPort(PortOverride),
    SetAudioEnabled(bool),
    SetUseManualAudio(bool),
    SetPrefersNoInterruptions(bool),
    DidActivateCallKit,
    DidDeactivateCallKit,
}

pub struct MockAudioSessionHardware {
    active: AtomicBool,
    calls: Mutex<Vec<HardwareCall>>,
    failure: Mutex<Option<AudioError>>,
    options: Mutex<CategoryOptions>,
    route: Mutex<AudioRoute>,
    permission: Mutex<AudioResult<bool>>,
    notifications: broadcast::Sender<AudioSessionNotification>,
}

impl MockAudioSessionHardware {
    pub fn new() -> Self {
        let (notifications, _) = broadcast::channel(32);
        Self {
            active: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            options: Mutex::new(CategoryOptions::NONE),
            route: Mutex::new(AudioRoute::empty()),
            permission: Mutex::new(Ok(true)),
            notifications,
        }
    }

    /// Successful calls in the order they were made
    pub fn calls(&self) -> Vec<HardwareCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Fail the next fallible call with `error`
    pub fn fail_next(&self, error: AudioError) {
        *self.failure.lock() = Some(error);
    }

    /// Change the platform activation flag without recording a call
    pub fn set_active_state(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn emit(&self, notification: AudioSessionNotification) {
        let _ = self.notifications.send(notification);
    }

    pub fn set_permission(&self, granted: bool) {
        *self.permission.lock() = Ok(granted);
    }

    pub fn fail_permission(&self, error: AudioError) {
        *self.permission.lock() = Err(error);
    }

    pub fn set_route(&self, route: AudioRoute) {
        *self.route.lock() = route;
    }

    fn check(&self) -> AudioResult<()> {
        match self.failure.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn record(&self, call: HardwareCall) {
        self.calls.lock().push(call);
    }
}

impl Default for MockAudioSessionHardware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioSessionHardware for MockAudioSessionHardware {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn set_active(&self, active: bool) -> AudioResult<()> {
        self.check()?;
        self.active.store(active, Ordering::SeqCst);
        self.record(HardwareCall::SetActive(active));
        Ok(())
    }

    fn category_options(&self) -> CategoryOptions {
        *self.options.lock()
    }

    fn set_configuration(&self, configuration: &AudioSessionConfiguration) -> AudioResult<()> {
        self.check()?;
        *self.options.lock() = configuration.options;
        self.record(HardwareCall::SetConfiguration(*configuration));
        Ok(())
    }

    fn override_output_port(&self, port: PortOverride) -> AudioResult<()> {
        self.check()?;
        self.record(HardwareCall::OverrideOutputPort(port));
        Ok(())
    }

    fn set_audio_enabled(&self, enabled: bool) {
        self.record(HardwareCall::SetAudioEnabled(enabled));
    }

    fn set_use_manual_audio(&self, enabled: bool) {
        self.record(HardwareCall::SetUseManualAudio(enabled));
    }

    fn set_prefers_no_interruptions_from_system_alerts(&self, value: bool) -> AudioResult<()> {
        self.check()?;
        self.record(HardwareCall::SetPrefersNoInterruptions(value));
        Ok(())
    }

    fn did_activate_callkit(&self) {
        self.active.store(true, Ordering::SeqCst);
        self.record(HardwareCall::DidActivateCallKit);
    }

    fn did_deactivate_callkit(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.record(HardwareCall::DidDeactivateCallKit);
    }

    fn current_route(&self) -> AudioRoute {
        self.route.lock().clone()
    }

    fn notifications(&self) -> broadcast::Receiver<AudioSessionNotification> {
        self.notifications.subscribe()
    }

    async fn request_record_permission(&self) -> AudioResult<bool> {
        self.permission.lock().clone()
    }
}

/// Device module whose publishers follow its setters
pub struct MockAudioDeviceModule {
    recording: watch::Sender<bool>,
    muted: watch::Sender<bool>,
    level: Mutex<f32>,
    recording_updates: Mutex<Vec<bool>>,
    mute_updates: Mutex<Vec<bool>>,
    stereo_updates: Mutex<Vec<bool>>,
}

impl MockAudioDeviceModule {
    pub fn new() -> Self {
        Self {
            recording: watch::channel(false).0,
            muted: watch::channel(true).0,
            level: Mutex::new(-160.0),
            recording_updates: Mutex::new(Vec::new()),
            mute_updates: Mutex::new(Vec::new()),
            stereo_updates: Mutex::new(Vec::new()),
        }
    }

    pub fn recording_updates(&self) -> Vec<bool> {
        self.recording_updates.lock().clone()
    }

    pub fn mute_updates(&self) -> Vec<bool> {
        self.mute_updates.lock().clone()
    }

    pub fn stereo_playout_updates(&self) -> Vec<bool> {
        self.stereo_updates.lock().clone()
    }

    pub fn set_audio_level(&self, level: f32) {
        *self.level.lock() = level;
    }

    /// Change mute from the platform side, as a hardware toggle would
    pub fn set_microphone_muted_from_platform(&self, muted: bool) {
        self.muted.send_replace(muted);
    }

    fn publish(sender: &watch::Sender<bool>, value: bool) {
        sender.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }
}

impl Default for MockAudioDeviceModule {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDeviceModule for MockAudioDeviceModule {
    fn is_recording(&self) -> bool {
        *self.recording.borrow()
    }

    fn set_recording(&self, recording: bool) -> AudioResult<()> {
        self.recording_updates.lock().push(recording);
        Self::publish(&self.recording, recording);
        Ok(())
    }

    fn is_microphone_muted(&self) -> bool {
        *self.muted.borrow()
    }

    fn set_muted(&self, muted: bool) -> AudioResult<()> {
        self.mute_updates.lock().push(muted);
        Self::publish(&self.muted, muted);
        Ok(())
    }

    fn set_stereo_playout_enabled(&self, enabled: bool) -> AudioResult<()> {
        self.stereo_updates.lock().push(enabled);
        Ok(())
    }

    fn audio_level(&self) -> f32 {
        *self.level.lock()
    }

    fn subscribe_recording(&self) -> watch::Receiver<bool> {
        self.recording.subscribe()
    }

    fn subscribe_microphone_muted(&self) -> watch::Receiver<bool> {
        self.muted.subscribe()
    }
}

pub struct MockAudioRecorder {
    recording: AtomicBool,
    refuse: AtomicBool,
    record_calls: AtomicUsize,
    power: Mutex<f32>,
}

impl MockAudioRecorder {
    pub fn new() -> Self {
        Self {
            recording: AtomicBool::new(false),
            refuse: AtomicBool::new(false),
            record_calls: AtomicUsize::new(0),
            power: Mutex::new(-160.0),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn record_calls(&self) -> usize {
        self.record_calls.load(Ordering::SeqCst)
    }

    pub fn set_power(&self, power: f32) {
        *self.power.lock() = power;
    }

    /// Make `record` report that the platform refused to start
    pub fn refuse(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }
}

impl Default for MockAudioRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioRecorder for MockAudioRecorder {
    fn record(&self) -> AudioResult<bool> {
        self.record_calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.recording.store(true, Ordering::SeqCst);
        Ok(true)
    }

    fn stop(&self) {
        self.recording.store(false, Ordering::SeqCst);
    }

    fn average_power(&self) -> f32 {
        *self.power.lock()
    }
}
