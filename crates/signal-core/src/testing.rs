//! Recording test doubles for the signaling collaborators

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use crate::auth::{JoinCallResponse, JoinResponseProvider};
use crate::error::{SignalError, SignalResult};
use crate::messages::{
    IceRestartRequest, IceTrickleRequest, RpcResponse, SendAnswerRequest, SendStatsRequest, SetPublisherRequest,
    JoinResponseEvent, SetPublisherResponse, SfuError, SfuEvent, SignalRequest, UpdateMuteStatesRequest,
    UpdateSubscriptionsRequest,
};
use crate::models::ConnectionState;
use crate::transport::{SignalService, SignalServiceFactory, SignalTransport, SignalTransportFactory};

/// In-memory signaling transport
pub struct MockSignalTransport {
    hostname: String,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: broadcast::Sender<SfuEvent>,
    sent: Mutex<Vec<SignalRequest>>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    fail_sends: AtomicBool,
    connect_on_request: AtomicBool,
    answer_joins: AtomicBool,
}

impl MockSignalTransport {
    pub fn new(hostname: impl Into<String>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Initialized);
        let (event_tx, _) = broadcast::channel(64);
        Self {
            hostname: hostname.into(),
            state_tx,
            event_tx,
            sent: Mutex::new(Vec::new()),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            connect_on_request: AtomicBool::new(true),
            answer_joins: AtomicBool::new(false),
        }
    }

    /// Drive the connection state
    pub fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Deliver an inbound event
    pub fn emit(&self, event: SfuEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Make `send` fail
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Whether `connect` moves the state to connected by itself
    pub fn connect_on_request(&self, enabled: bool) {
        self.connect_on_request.store(enabled, Ordering::SeqCst);
    }

    /// Whether a join request is answered with a join response event
    pub fn answer_joins(&self, enabled: bool) {
        self.answer_joins.store(enabled, Ordering::SeqCst);
    }

    pub fn sent_requests(&self) -> Vec<SignalRequest> {
        self.sent.lock().clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalTransport for MockSignalTransport {
    async fn connect(&self) -> SignalResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.connect_on_request.load(Ordering::SeqCst) {
            self.set_state(ConnectionState::Connected);
        } else {
            self.set_state(ConnectionState::Connecting);
        }
        Ok(())
    }

    async fn disconnect(&self, reason: &str) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected {
            reason: Some(reason.to_string()),
        });
    }

    async fn send(&self, request: SignalRequest) -> SignalResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SignalError::transport("socket closed"));
        }
        let is_join = matches!(request, SignalRequest::Join(_));
        self.sent.lock().push(request);
        if is_join && self.answer_joins.load(Ordering::SeqCst) {
            self.emit(SfuEvent::JoinResponse(JoinResponseEvent {
                participant_count: 1,
                ..Default::default()
            }));
        }
        Ok(())
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn events(&self) -> broadcast::Receiver<SfuEvent> {
        self.event_tx.subscribe()
    }

    fn hostname(&self) -> String {
        self.hostname.clone()
    }
}

/// Transport factory handing out [`MockSignalTransport`]s
#[derive(Default)]
pub struct MockSignalTransportFactory {
    made: Mutex<Vec<Arc<MockSignalTransport>>>,
    answer_joins: AtomicBool,
}

impl MockSignalTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transports created so far
    pub fn transports(&self) -> Vec<Arc<MockSignalTransport>> {
        self.made.lock().clone()
    }

    /// Make every transport created from now on answer join requests
    pub fn answer_joins(&self, enabled: bool) {
        self.answer_joins.store(enabled, Ordering::SeqCst);
    }
}

impl SignalTransportFactory for MockSignalTransportFactory {
    fn make_transport(&self, ws_endpoint: &str, _token: &str) -> SignalResult<Arc<dyn SignalTransport>> {
        let transport = Arc::new(MockSignalTransport::new(ws_endpoint));
        transport.answer_joins(self.answer_joins.load(Ordering::SeqCst));
        self.made.lock().push(transport.clone());
        Ok(transport)
    }
}

/// Recording RPC service
#[derive(Default)]
pub struct MockSignalService {
    set_publisher: Mutex<Vec<SetPublisherRequest>>,
    answers: Mutex<Vec<SendAnswerRequest>>,
    trickles: Mutex<Vec<IceTrickleRequest>>,
    ice_restarts: Mutex<Vec<IceRestartRequest>>,
    subscriptions: Mutex<Vec<UpdateSubscriptionsRequest>>,
    mute_states: Mutex<Vec<UpdateMuteStatesRequest>>,
    stats: Mutex<Vec<SendStatsRequest>>,
    publisher_response: Mutex<SetPublisherResponse>,
    response_error: Mutex<Option<SfuError>>,
    failures: Mutex<VecDeque<SignalError>>,
}

impl MockSignalService {
    pub fn new() -> Self {
        Self {
            publisher_response: Mutex::new(SetPublisherResponse {
                sdp: "v=0 answer".into(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Response returned by `set_publisher`
    pub fn set_publisher_response(&self, response: SetPublisherResponse) {
        *self.publisher_response.lock() = response;
    }

    /// Error payload attached to every response
    pub fn set_response_error(&self, error: SfuError) {
        *self.response_error.lock() = Some(error);
    }

    /// Fail the next RPC, whatever it is, with `error`
    pub fn fail_next(&self, error: SignalError) {
        self.failures.lock().push_back(error);
    }

    pub fn set_publisher_requests(&self) -> Vec<SetPublisherRequest> {
        self.set_publisher.lock().clone()
    }

    pub fn answers(&self) -> Vec<SendAnswerRequest> {
        self.answers.lock().clone()
    }

    pub fn ice_trickles(&self) -> Vec<IceTrickleRequest> {
        self.trickles.lock().clone()
    }

    pub fn ice_restarts(&self) -> Vec<IceRestartRequest> {
        self.ice_restarts.lock().clone()
    }

    pub fn subscription_updates(&self) -> Vec<UpdateSubscriptionsRequest> {
        self.subscriptions.lock().clone()
    }

    pub fn mute_state_updates(&self) -> Vec<UpdateMuteStatesRequest> {
        self.mute_states.lock().clone()
    }

    pub fn stats_reports(&self) -> Vec<SendStatsRequest> {
        self.stats.lock().clone()
    }

    fn outcome(&self) -> SignalResult<RpcResponse> {
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        Ok(RpcResponse {
            error: self.response_error.lock().clone(),
        })
    }
}

#[async_trait]
impl SignalService for MockSignalService {
    async fn set_publisher(&self, request: SetPublisherRequest) -> SignalResult<SetPublisherResponse> {
        self.set_publisher.lock().push(request);
        let outcome = self.outcome()?;
        let mut response = self.publisher_response.lock().clone();
        if outcome.error.is_some() {
            response.error = outcome.error;
        }
        Ok(response)
    }

    async fn send_answer(&self, request: SendAnswerRequest) -> SignalResult<RpcResponse> {
        self.answers.lock().push(request);
        self.outcome()
    }

    async fn ice_trickle(&self, request: IceTrickleRequest) -> SignalResult<RpcResponse> {
        self.trickles.lock().push(request);
        self.outcome()
    }

    async fn ice_restart(&self, request: IceRestartRequest) -> SignalResult<RpcResponse> {
        self.ice_restarts.lock().push(request);
        self.outcome()
    }

    async fn update_subscriptions(&self, request: UpdateSubscriptionsRequest) -> SignalResult<RpcResponse> {
        self.subscriptions.lock().push(request);
        self.outcome()
    }

    async fn update_mute_states(&self, request: UpdateMuteStatesRequest) -> SignalResult<RpcResponse> {
        self.mute_states.lock().push(request);
        self.outcome()
    }

    async fn send_stats(&self, request: SendStatsRequest) -> SignalResult<RpcResponse> {
        self.stats.lock().push(request);
        self.outcome()
    }
}

/// Service factory handing out one shared [`MockSignalService`]
#[derive(Default)]
pub struct MockSignalServiceFactory {
    service: Arc<MockSignalService>,
    urls: Mutex<Vec<String>>,
}

impl MockSignalServiceFactory {
    pub fn new() -> Self {
        Self {
            service: Arc::new(MockSignalService::new()),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn service(&self) -> Arc<MockSignalService> {
        self.service.clone()
    }

    /// Urls services were requested for
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

impl SignalServiceFactory for MockSignalServiceFactory {
    fn make_service(&self, url: &str, _token: &str) -> SignalResult<Arc<dyn SignalService>> {
        self.urls.lock().push(url.to_string());
        Ok(self.service.clone())
    }
}

/// Join-response provider returning a fixed response or error
pub struct StaticJoinResponseProvider {
    response: Option<JoinCallResponse>,
    error: Option<String>,
    calls: AtomicUsize,
}

impl StaticJoinResponseProvider {
    pub fn new(response: JoinCallResponse) -> Self {
        Self {
            response: Some(response),
            error: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            response: None,
            error: Some(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JoinResponseProvider for StaticJoinResponseProvider {
    async fn join_call(&self) -> anyhow::Result<JoinCallResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match (&self.response, &self.error) {
            (Some(response), _) => Ok(response.clone()),
            (None, Some(error)) => Err(anyhow::anyhow!(error.clone())),
            (None, None) => Err(anyhow::anyhow!("no response configured")),
        }
    }
}
