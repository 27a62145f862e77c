//! Call session orchestration
//!
//! A [`CallSession`] owns every component of one call and runs the join
//! pipeline in order: authenticate, connect the signaling transport, set
//! up the peer connections, capture local tracks, send the join request,
//! publish, then activate audio and statistics. The call state machine
//! decides when a join may run; [`CallSession::leave`] tears everything
//! down again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vidcall_audio_core::{AudioSessionHardware, AudioStore};
use vidcall_call_core::{
    AcceptCallResponse, CallActions, CallStage, CallStateMachine, JoinInput, RejectCallResponse,
};
use vidcall_infra_common::with_timeout;
use vidcall_peer_core::{
    CaptureProvider, LocalTracksAdapter, PeerConnectionFactory, PeerConnectionsAdapter, RtcConfiguration,
};
use vidcall_signal_core::messages::JoinResponseEvent;
use vidcall_signal_core::{
    AuthenticationAdapter, CallSettings, JoinCallResponse, PeerConnectionType, SfuAdapter, SfuEvent, SignalError,
    SignalServiceFactory, SignalTransportFactory, TrackType,
};
use vidcall_stats_core::{StatsAdapter, StatsSource};

use crate::api::{CallApi, JoinRequestProvider};
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};

/// Builder for [`CallSession`]
///
/// The call API, both signaling factories, the peer connection factory and
/// the capture provider are required. Audio is optional: supply either a
/// ready [`AudioStore`] or the hardware to build one from the session
/// configuration.
pub struct CallSessionBuilder {
    call_cid: String,
    config: SessionConfig,
    api: Option<Arc<dyn CallApi>>,
    transport_factory: Option<Arc<dyn SignalTransportFactory>>,
    service_factory: Option<Arc<dyn SignalServiceFactory>>,
    peer_connection_factory: Option<Arc<dyn PeerConnectionFactory>>,
    capture: Option<Arc<dyn CaptureProvider>>,
    audio_store: Option<Arc<AudioStore>>,
    audio_hardware: Option<Arc<dyn AudioSessionHardware>>,
}

impl CallSessionBuilder {
    pub fn new(call_cid: impl Into<String>) -> Self {
        Self {
            call_cid: call_cid.into(),
            config: SessionConfig::default(),
            api: None,
            transport_factory: None,
            service_factory: None,
            peer_connection_factory: None,
            capture: None,
            audio_store: None,
            audio_hardware: None,
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn call_api(mut self, api: Arc<dyn CallApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn transport_factory(mut self, factory: Arc<dyn SignalTransportFactory>) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    pub fn service_factory(mut self, factory: Arc<dyn SignalServiceFactory>) -> Self {
        self.service_factory = Some(factory);
        self
    }

    pub fn peer_connection_factory(mut self, factory: Arc<dyn PeerConnectionFactory>) -> Self {
        self.peer_connection_factory = Some(factory);
        self
    }

    pub fn capture_provider(mut self, capture: Arc<dyn CaptureProvider>) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Use an existing audio store; takes precedence over [`audio_hardware`](Self::audio_hardware)
    pub fn audio_store(mut self, store: Arc<AudioStore>) -> Self {
        self.audio_store = Some(store);
        self
    }

    /// Build an audio store for `hardware` from the session configuration
    pub fn audio_hardware(mut self, hardware: Arc<dyn AudioSessionHardware>) -> Self {
        self.audio_hardware = Some(hardware);
        self
    }

    /// Assemble the session; must be called within a tokio runtime
    pub fn build(self) -> SessionResult<CallSession> {
        let api = self.api.ok_or_else(|| SessionError::missing("call api"))?;
        let transport_factory = self
            .transport_factory
            .ok_or_else(|| SessionError::missing("signal transport factory"))?;
        let service_factory = self
            .service_factory
            .ok_or_else(|| SessionError::missing("signal service factory"))?;
        let peer_connection_factory = self
            .peer_connection_factory
            .ok_or_else(|| SessionError::missing("peer connection factory"))?;
        let capture = self.capture.ok_or_else(|| SessionError::missing("capture provider"))?;

        let audio = match (self.audio_store, self.audio_hardware) {
            (Some(store), _) => Some(store),
            (None, Some(hardware)) => Some(Arc::new(
                AudioStore::builder(hardware)
                    .defaults(self.config.audio_defaults())
                    .config(self.config.audio.clone())
                    .build(),
            )),
            (None, None) => None,
        };

        let provider = Arc::new(JoinRequestProvider::new(api.clone(), self.call_cid.clone()));
        let auth = AuthenticationAdapter::new(
            self.config.api_key.clone(),
            Uuid::new_v4().to_string(),
            provider.clone(),
        );
        let connections = Arc::new(PeerConnectionsAdapter::new(
            peer_connection_factory,
            self.config.coordinator.clone(),
        ));

        let inner = Arc::new(SessionInner {
            call_cid: self.call_cid,
            unified_session_id: Uuid::new_v4().to_string(),
            config: self.config,
            api,
            provider,
            auth,
            transport_factory,
            service_factory,
            capture,
            audio,
            connections,
            sfu: RwLock::new(None),
            local_tracks: RwLock::new(None),
            stats: Mutex::new(None),
            call_settings: Mutex::new(None),
            audio_on: watch::channel(false).0,
            left: AtomicBool::new(false),
        });
        let machine = CallStateMachine::new(&inner);

        Ok(CallSession { inner, machine })
    }
}

struct SessionInner {
    call_cid: String,
    unified_session_id: String,
    config: SessionConfig,
    api: Arc<dyn CallApi>,
    provider: Arc<JoinRequestProvider>,
    auth: AuthenticationAdapter,
    transport_factory: Arc<dyn SignalTransportFactory>,
    service_factory: Arc<dyn SignalServiceFactory>,
    capture: Arc<dyn CaptureProvider>,
    audio: Option<Arc<AudioStore>>,
    connections: Arc<PeerConnectionsAdapter>,
    sfu: RwLock<Option<Arc<SfuAdapter>>>,
    local_tracks: RwLock<Option<Arc<LocalTracksAdapter>>>,
    stats: Mutex<Option<StatsAdapter>>,
    call_settings: Mutex<Option<CallSettings>>,
    audio_on: watch::Sender<bool>,
    left: AtomicBool,
}

impl SessionInner {
    async fn connect_and_join(&self, input: &JoinInput) -> SessionResult<JoinCallResponse> {
        // leftovers of a previous attempt
        self.teardown().await;

        self.provider.set_input(input.clone());
        let response = self.auth.authenticate(true).await?;
        let credentials = self.auth.credentials();
        let session_id = credentials.session_id.clone();

        let transport = self
            .transport_factory
            .make_transport(&credentials.ws_endpoint, &credentials.token)?;
        let service = self
            .service_factory
            .make_service(&response.credentials.server.url, &credentials.token)?;
        let sfu = Arc::new(SfuAdapter::new(
            transport,
            service,
            self.config.sfu.clone(),
            self.config.client_details.clone(),
        ));
        *self.sfu.write() = Some(sfu.clone());

        sfu.connect().await?;
        with_timeout("connect", self.config.connect_timeout, wait_until_connected(&sfu)).await??;
        debug!(session_id = %session_id, host = %sfu.hostname(), "Signaling connected");

        self.connections.set_sfu_adapter(sfu.clone(), session_id.clone());
        self.connections.set_rtc_configuration(RtcConfiguration {
            ice_servers: response.credentials.ice_servers.clone(),
        });

        let settings = input
            .call_settings
            .clone()
            .unwrap_or_else(|| response.call_settings.clone());
        let local_tracks = Arc::new(LocalTracksAdapter::new(
            self.capture.clone(),
            response.own_capabilities.clone(),
        ));
        local_tracks.setup_if_required(&settings).await?;
        *self.local_tracks.write() = Some(local_tracks.clone());

        let offer = self.connections.make_temporary_offer(&local_tracks).await?;
        let mut events = sfu.subscribe_events();
        sfu.join(&session_id, &offer.sdp, false, &credentials.token).await;
        let joined = with_timeout("join", self.config.join_timeout, wait_for_join_response(&mut events)).await??;
        info!(
            call_cid = %self.call_cid,
            session_id = %session_id,
            participants = joined.participant_count,
            "Joined call"
        );

        self.connections.setup_if_required(PeerConnectionType::Subscriber)?;
        self.connections.publish_local_tracks(&local_tracks)?;

        self.audio_on.send_replace(settings.audio_on);
        if let Some(audio) = &self.audio {
            audio.activate(&settings).await?;
            if let Err(e) = audio.request_record_permission().await {
                warn!(error = %e, "Recording permission request failed");
            }
            audio.set_active_call(Some(self.audio_on.subscribe()));
        }
        *self.call_settings.lock() = Some(settings);

        let source: Arc<dyn StatsSource> = self.connections.clone();
        let stats = StatsAdapter::new(&source, self.config.stats.clone());
        stats.set_sfu_adapter(Some(sfu));
        stats.set_session(session_id, self.unified_session_id.clone());
        stats.set_error_handler(|e| debug!(error = %e, "Statistics delivery error"));
        stats.start();
        stats.publisher_did_change();
        *self.stats.lock() = Some(stats);

        Ok(response)
    }

    /// Close media and signaling; the audio session is left alone
    async fn teardown(&self) {
        if let Some(stats) = self.stats.lock().take() {
            stats.stop();
        }
        self.connections.close_all().await;
        let local_tracks = self.local_tracks.write().take();
        if let Some(local_tracks) = local_tracks {
            local_tracks.stop_all().await;
        }
        let sfu = self.sfu.write().take();
        if let Some(sfu) = sfu {
            sfu.disconnect().await;
        }
    }
}

#[async_trait]
impl CallActions for SessionInner {
    fn call_cid(&self) -> String {
        self.call_cid.clone()
    }

    async fn accept(&self) -> anyhow::Result<AcceptCallResponse> {
        self.api.accept_call(&self.call_cid).await?;
        Ok(AcceptCallResponse {
            call_cid: self.call_cid.clone(),
        })
    }

    async fn reject(&self, reason: Option<String>) -> anyhow::Result<RejectCallResponse> {
        self.api.reject_call(&self.call_cid, reason.as_deref()).await?;
        Ok(RejectCallResponse {
            call_cid: self.call_cid.clone(),
            reason,
        })
    }

    async fn join(&self, input: &JoinInput) -> anyhow::Result<JoinCallResponse> {
        match self.connect_and_join(input).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(call_cid = %self.call_cid, error = %e, "Join attempt failed");
                self.teardown().await;
                Err(e.into())
            }
        }
    }
}

async fn wait_until_connected(sfu: &SfuAdapter) -> SessionResult<()> {
    let mut state = sfu.subscribe_connection_state();
    loop {
        if state.borrow_and_update().is_connected() {
            return Ok(());
        }
        if state.changed().await.is_err() {
            return Err(SignalError::not_connected("connect").into());
        }
    }
}

async fn wait_for_join_response(events: &mut broadcast::Receiver<SfuEvent>) -> SessionResult<JoinResponseEvent> {
    loop {
        match events.recv().await {
            Ok(SfuEvent::JoinResponse(response)) => return Ok(response),
            Ok(SfuEvent::Error(event)) => {
                return Err(SignalError::rpc("join", event.error.code, event.error.message).into());
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped = skipped, "Missed SFU events while waiting for the join response");
            }
            Err(broadcast::error::RecvError::Closed) => {
                return Err(SignalError::not_connected("join").into());
            }
        }
    }
}

/// One call: its stage machine plus every component a joined call needs
pub struct CallSession {
    inner: Arc<SessionInner>,
    machine: Arc<CallStateMachine>,
}

impl CallSession {
    pub fn builder(call_cid: impl Into<String>) -> CallSessionBuilder {
        CallSessionBuilder::new(call_cid)
    }

    pub fn call_cid(&self) -> &str {
        &self.inner.call_cid
    }

    /// Current SFU session id; rotates with every join attempt
    pub fn session_id(&self) -> String {
        self.inner.auth.session_id()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn stage(&self) -> CallStage {
        self.machine.stage()
    }

    pub fn subscribe_stage(&self) -> watch::Receiver<CallStage> {
        self.machine.subscribe()
    }

    pub fn state_machine(&self) -> &Arc<CallStateMachine> {
        &self.machine
    }

    pub fn sfu_adapter(&self) -> Option<Arc<SfuAdapter>> {
        self.inner.sfu.read().clone()
    }

    pub fn peer_connections(&self) -> &Arc<PeerConnectionsAdapter> {
        &self.inner.connections
    }

    pub fn local_tracks(&self) -> Option<Arc<LocalTracksAdapter>> {
        self.inner.local_tracks.read().clone()
    }

    pub fn audio_store(&self) -> Option<&Arc<AudioStore>> {
        self.inner.audio.as_ref()
    }

    /// Settings in effect since the last join or update
    pub fn call_settings(&self) -> Option<CallSettings> {
        self.inner.call_settings.lock().clone()
    }

    pub fn has_left(&self) -> bool {
        self.inner.left.load(Ordering::SeqCst)
    }

    /// Join input carrying the configured retry policy
    pub fn join_input(&self) -> JoinInput {
        JoinInput {
            retry_policy: self.inner.config.join_retry.clone(),
            ..JoinInput::default()
        }
    }

    pub async fn accept(&self) -> SessionResult<AcceptCallResponse> {
        self.ensure_open()?;
        let outcome = self.machine.accept().ok_or_else(|| self.invalid_stage("accept"))?;
        Ok(outcome.await?)
    }

    pub async fn reject(&self, reason: Option<String>) -> SessionResult<RejectCallResponse> {
        self.ensure_open()?;
        let outcome = self.machine.reject(reason).ok_or_else(|| self.invalid_stage("reject"))?;
        Ok(outcome.await?)
    }

    /// Run the join pipeline through the state machine
    pub async fn join(&self, input: JoinInput) -> SessionResult<JoinCallResponse> {
        self.ensure_open()?;
        let outcome = self.machine.join(input).ok_or_else(|| self.invalid_stage("join"))?;
        Ok(outcome.await?)
    }

    /// Apply new call settings to tracks, audio and the SFU mute state
    pub async fn update_call_settings(&self, settings: CallSettings) -> SessionResult<()> {
        let previous = self.inner.call_settings.lock().clone().ok_or(SessionError::NotJoined)?;

        if let Some(local_tracks) = self.local_tracks() {
            local_tracks.did_update_call_settings(&settings).await?;
        }
        if let Some(audio) = &self.inner.audio {
            audio.did_update_call_settings(&settings).await?;
        }
        self.inner.audio_on.send_replace(settings.audio_on);

        if let Some(sfu) = self.sfu_adapter() {
            let session_id = self.session_id();
            if previous.audio_on != settings.audio_on {
                sfu.update_track_mute_state(TrackType::Audio, !settings.audio_on, &session_id)
                    .await?;
            }
            if previous.video_on != settings.video_on {
                sfu.update_track_mute_state(TrackType::Video, !settings.video_on, &session_id)
                    .await?;
            }
        }

        *self.inner.call_settings.lock() = Some(settings);
        Ok(())
    }

    /// Trigger a statistics delivery outside the regular schedule
    pub fn trigger_stats_delivery(&self) -> bool {
        self.inner
            .stats
            .lock()
            .as_ref()
            .is_some_and(|stats| stats.trigger_delivery())
    }

    /// Leave the call and release every component; idempotent
    pub async fn leave(&self, reason: &str) {
        if self.inner.left.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(call_cid = %self.inner.call_cid, reason = reason, "Leaving call");

        if let Some(sfu) = self.sfu_adapter() {
            sfu.notify_leave(&self.session_id(), reason).await;
        }
        self.inner.teardown().await;

        if let Some(audio) = &self.inner.audio {
            if let Err(e) = audio.deactivate().await {
                error!(error = %e, "Failed to deactivate the audio session");
            }
        }
        *self.inner.call_settings.lock() = None;
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.has_left() {
            return Err(SessionError::Left);
        }
        Ok(())
    }

    fn invalid_stage(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidStage {
            operation,
            stage: self.machine.stage_id(),
        }
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("call_cid", &self.inner.call_cid)
            .field("stage", &self.machine.stage_id())
            .field("left", &self.has_left())
            .finish()
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        if let Some(stats) = self.inner.stats.lock().take() {
            stats.stop();
        }
        if let Some(audio) = &self.inner.audio {
            audio.set_active_call(None);
        }
    }
}
