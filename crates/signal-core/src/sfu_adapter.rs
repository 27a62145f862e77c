//! SFU Adapter
//!
//! Owns the signaling transport and the RPC surface of the SFU. Inbound
//! events and connection-state transitions are republished on channels owned
//! by the adapter, so subscribers survive a transport swap (see
//! [`SfuAdapter::refresh`]).

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};
use vidcall_infra_common::{DisposableBag, RetryPolicy, retry_while, retry_with_policy};

use crate::error::{SignalError, SignalResult};
use crate::messages::{
    IceRestartRequest, IceTrickleRequest, JoinRequest, LeaveCallRequest, Migration, SendAnswerRequest,
    SendStatsRequest, SetPublisherRequest, SfuError, SfuEvent, SignalRequest, UpdateMuteStatesRequest,
    UpdateSubscriptionsRequest,
};
use crate::models::{
    ClientDetails, ConnectionState, IceCandidate, PeerType, ReconnectionStrategy, TrackInfo,
    TrackMuteState, TrackSubscriptionDetails, TrackType,
};
use crate::transport::{SignalService, SignalTransport};

/// SFU adapter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SfuAdapterConfig {
    /// Retry policy for set-publisher
    pub rpc_retry: RetryPolicy,
    /// Retry policy for subscription updates
    pub subscription_retry: RetryPolicy,
    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
}

impl Default for SfuAdapterConfig {
    fn default() -> Self {
        Self {
            rpc_retry: RetryPolicy::fast(),
            subscription_retry: RetryPolicy::persistent(),
            event_buffer: 256,
        }
    }
}

/// Signaling adapter for one SFU session
pub struct SfuAdapter {
    /// Current signaling transport
    transport: RwLock<Arc<dyn SignalTransport>>,

    /// RPC surface
    service: Arc<dyn SignalService>,

    config: SfuAdapterConfig,

    client_details: ClientDetails,

    /// Republished connection state
    connection_tx: watch::Sender<ConnectionState>,

    /// Republished inbound events
    event_tx: broadcast::Sender<SfuEvent>,

    /// Fired after the transport has been replaced
    refresh_tx: broadcast::Sender<()>,

    /// Reconnection hint derived from SFU error events
    preferred_reconnection_strategy: Arc<Mutex<ReconnectionStrategy>>,

    /// Forwarding tasks
    bag: DisposableBag,
}

impl SfuAdapter {
    /// Create an adapter bound to `transport`
    ///
    /// Must be called from within a tokio runtime; forwarding tasks are
    /// spawned immediately.
    pub fn new(
        transport: Arc<dyn SignalTransport>,
        service: Arc<dyn SignalService>,
        config: SfuAdapterConfig,
        client_details: ClientDetails,
    ) -> Self {
        let (connection_tx, _) = watch::channel(transport.connection_state().borrow().clone());
        let (event_tx, _) = broadcast::channel(config.event_buffer.max(1));
        let (refresh_tx, _) = broadcast::channel(8);

        let adapter = Self {
            transport: RwLock::new(transport.clone()),
            service,
            config,
            client_details,
            connection_tx,
            event_tx,
            refresh_tx,
            preferred_reconnection_strategy: Arc::new(Mutex::new(ReconnectionStrategy::default())),
            bag: DisposableBag::new("sfu-adapter"),
        };

        adapter.observe_errors();
        adapter.bind_transport(transport);
        adapter
    }

    // ===== Observation =====

    /// Current connection state of the signaling channel
    pub fn connection_state(&self) -> ConnectionState {
        self.connection_tx.borrow().clone()
    }

    /// Whether the signaling channel is connected
    pub fn is_connected(&self) -> bool {
        self.connection_tx.borrow().is_connected()
    }

    /// Subscribe to connection state transitions
    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection_tx.subscribe()
    }

    /// Subscribe to inbound SFU events
    pub fn subscribe_events(&self) -> broadcast::Receiver<SfuEvent> {
        self.event_tx.subscribe()
    }

    /// Subscribe to transport refreshes
    pub fn subscribe_refresh(&self) -> broadcast::Receiver<()> {
        self.refresh_tx.subscribe()
    }

    /// Reconnection hint recorded from the latest SFU error event
    pub fn preferred_reconnection_strategy(&self) -> ReconnectionStrategy {
        *self.preferred_reconnection_strategy.lock()
    }

    /// Host of the current transport
    pub fn hostname(&self) -> String {
        self.transport().hostname()
    }

    // ===== Connection =====

    /// Connect the signaling transport
    ///
    /// No-op when already connected or connecting.
    pub async fn connect(&self) -> SignalResult<()> {
        let state = self.connection_state();
        if state.is_active() {
            debug!(state = %state, "Signaling already active, skipping connect");
            return Ok(());
        }
        info!(host = %self.hostname(), "Connecting to SFU");
        self.transport().connect().await
    }

    /// Disconnect the signaling transport
    pub async fn disconnect(&self) {
        info!(host = %self.hostname(), "Disconnecting from SFU");
        self.transport().disconnect("client disconnect").await;
    }

    /// Replace the transport, e.g. after a migration
    ///
    /// Subscribers keep their channels; a refresh signal tells observers to
    /// rebuild their subscriptions.
    pub async fn refresh(&self, transport: Arc<dyn SignalTransport>) {
        let previous = {
            let mut current = self.transport.write();
            std::mem::replace(&mut *current, transport.clone())
        };
        info!(from = %previous.hostname(), to = %transport.hostname(), "Refreshing signaling transport");
        previous.disconnect("transport refreshed").await;

        self.bind_transport(transport);
        let _ = self.refresh_tx.send(());
    }

    // ===== Fire-and-forget signaling =====

    /// Send a join request
    pub async fn join(&self, session_id: &str, subscriber_sdp: &str, is_fast_reconnecting: bool, token: &str) {
        let request = JoinRequest {
            session_id: session_id.to_string(),
            subscriber_sdp: subscriber_sdp.to_string(),
            token: token.to_string(),
            fast_reconnect: is_fast_reconnecting,
            client_details: self.client_details.clone(),
            migration: None,
        };
        self.send(SignalRequest::Join(request)).await;
    }

    /// Send a join request migrating from another SFU
    pub async fn migrate(&self, session_id: &str, subscriber_sdp: &str, token: &str, migrating_from: &str) {
        let request = JoinRequest {
            session_id: session_id.to_string(),
            subscriber_sdp: subscriber_sdp.to_string(),
            token: token.to_string(),
            fast_reconnect: false,
            client_details: self.client_details.clone(),
            migration: Some(Migration {
                from_sfu_id: migrating_from.to_string(),
                announced_tracks: Vec::new(),
                subscriptions: Vec::new(),
            }),
        };
        self.send(SignalRequest::Join(request)).await;
    }

    /// Best-effort departure notice
    pub async fn notify_leave(&self, session_id: &str, reason: &str) {
        let request = LeaveCallRequest {
            session_id: session_id.to_string(),
            reason: reason.to_string(),
        };
        self.send(SignalRequest::LeaveCall(request)).await;
    }

    async fn send(&self, request: SignalRequest) {
        let name = request.name();
        match self.transport().send(request).await {
            Ok(()) => debug!(request = name, "Sent signaling request"),
            Err(e) => error!(request = name, error = %e, "Failed to send signaling request"),
        }
    }

    // ===== RPC =====

    /// Trickle a local ICE candidate to the SFU
    pub async fn ice_trickle(&self, candidate: &IceCandidate, peer_type: PeerType, session_id: &str) -> SignalResult<()> {
        if candidate.sdp.is_empty() {
            debug!(peer_type = ?peer_type, "Skipping trickle of empty ICE candidate");
            return Ok(());
        }
        let request = IceTrickleRequest {
            peer_type,
            ice_candidate: candidate.to_json()?,
            session_id: session_id.to_string(),
        };
        let response = self.service.ice_trickle(request).await?;
        check_status("ice_trickle", response.error)
    }

    /// Send the publisher offer and return the SFU's answer SDP
    ///
    /// Retried with the RPC policy while the signaling channel stays
    /// connected.
    pub async fn set_publisher(&self, sdp: &str, tracks: Vec<TrackInfo>, session_id: &str) -> SignalResult<String> {
        let request = SetPublisherRequest {
            sdp: sdp.to_string(),
            session_id: session_id.to_string(),
            tracks,
        };

        retry_while(
            "set_publisher",
            &self.config.rpc_retry,
            || self.is_connected(),
            || {
                let request = request.clone();
                async move {
                    if !self.is_connected() {
                        return Err(SignalError::not_connected("set_publisher"));
                    }
                    let response = self.service.set_publisher(request).await?;
                    check_status("set_publisher", response.error)?;
                    Ok(response.sdp)
                }
            },
        )
        .await
    }

    /// Send the subscriber answer
    pub async fn send_answer(&self, sdp: &str, peer_type: PeerType, session_id: &str) -> SignalResult<()> {
        let request = SendAnswerRequest {
            peer_type,
            sdp: sdp.to_string(),
            session_id: session_id.to_string(),
        };
        let response = self.service.send_answer(request).await?;
        check_status("send_answer", response.error)
    }

    /// Ask the SFU to restart ICE for `peer_type`
    pub async fn restart_ice(&self, session_id: &str, peer_type: PeerType) -> SignalResult<()> {
        let request = IceRestartRequest {
            session_id: session_id.to_string(),
            peer_type,
        };
        let response = self.service.ice_restart(request).await?;
        check_status("ice_restart", response.error)
    }

    /// Update the set of remote tracks to receive
    pub async fn update_subscriptions(&self, tracks: Vec<TrackSubscriptionDetails>, session_id: &str) -> SignalResult<()> {
        let request = UpdateSubscriptionsRequest {
            session_id: session_id.to_string(),
            tracks,
        };
        retry_with_policy("update_subscriptions", &self.config.subscription_retry, || {
            let request = request.clone();
            async move {
                let response = self.service.update_subscriptions(request).await?;
                check_status("update_subscriptions", response.error)
            }
        })
        .await
    }

    /// Report the mute state of a published track
    pub async fn update_track_mute_state(&self, track_type: TrackType, muted: bool, session_id: &str) -> SignalResult<()> {
        let request = UpdateMuteStatesRequest {
            session_id: session_id.to_string(),
            mute_states: vec![TrackMuteState { track_type, muted }],
        };
        let response = self.service.update_mute_states(request).await?;
        check_status("update_mute_states", response.error)
    }

    /// Deliver a statistics report
    pub async fn send_stats(&self, request: SendStatsRequest) -> SignalResult<()> {
        let response = self.service.send_stats(request).await?;
        check_status("send_stats", response.error)
    }

    // ===== Internals =====

    fn transport(&self) -> Arc<dyn SignalTransport> {
        self.transport.read().clone()
    }

    fn bind_transport(&self, transport: Arc<dyn SignalTransport>) {
        let mut state_rx = transport.connection_state();
        let connection_tx = self.connection_tx.clone();
        self.bag.spawn_keyed("connection-state", async move {
            loop {
                let state = state_rx.borrow_and_update().clone();
                connection_tx.send_if_modified(|current| {
                    if *current == state {
                        return false;
                    }
                    debug!(from = %current, to = %state, "Signaling connection state changed");
                    *current = state;
                    true
                });
                if state_rx.changed().await.is_err() {
                    break;
                }
            }
        });

        let mut events_rx = transport.events();
        let event_tx = self.event_tx.clone();
        self.bag.spawn_keyed("events", async move {
            loop {
                match events_rx.recv().await {
                    Ok(event) => {
                        debug!(event = %event, "Received SFU event");
                        let _ = event_tx.send(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "SFU event forwarding lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    fn observe_errors(&self) {
        let mut events_rx = self.event_tx.subscribe();
        let strategy = self.preferred_reconnection_strategy.clone();
        self.bag.spawn_keyed("errors", async move {
            loop {
                match events_rx.recv().await {
                    Ok(SfuEvent::Error(event)) => {
                        warn!(
                            code = event.error.code,
                            message = %event.error.message,
                            strategy = ?event.reconnect_strategy,
                            "SFU reported an error"
                        );
                        *strategy.lock() = event.reconnect_strategy;
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

impl std::fmt::Debug for SfuAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SfuAdapter")
            .field("hostname", &self.hostname())
            .field("connection_state", &self.connection_state())
            .finish()
    }
}

fn check_status(operation: &str, error: Option<SfuError>) -> SignalResult<()> {
    match error {
        Some(error) if error.is_failure() => Err(SignalError::rpc(operation, error.code, error.message)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{SetPublisherResponse, SfuErrorEvent};
    use crate::testing::{MockSignalService, MockSignalTransport};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::sleep;
    use tracing_test::traced_test;

    fn adapter_with(transport: Arc<MockSignalTransport>, service: Arc<MockSignalService>) -> SfuAdapter {
        let config = SfuAdapterConfig {
            rpc_retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)),
            subscription_retry: RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(2)),
            event_buffer: 16,
        };
        SfuAdapter::new(transport, service, config, ClientDetails::default())
    }

    async fn settle() {
        sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_connection_state_is_republished() {
        let transport = Arc::new(MockSignalTransport::new("sfu-1.example.com"));
        let adapter = adapter_with(transport.clone(), Arc::new(MockSignalService::new()));
        let mut state_rx = adapter.subscribe_connection_state();

        transport.set_state(ConnectionState::Connected);
        state_rx.changed().await.unwrap();

        assert!(adapter.is_connected());
        assert_eq!(adapter.hostname(), "sfu-1.example.com");
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let transport = Arc::new(MockSignalTransport::new("sfu"));
        let adapter = adapter_with(transport.clone(), Arc::new(MockSignalService::new()));

        adapter.connect().await.unwrap();
        settle().await;
        adapter.connect().await.unwrap();

        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_join_and_leave_are_sent_over_transport() {
        let transport = Arc::new(MockSignalTransport::new("sfu"));
        let adapter = adapter_with(transport.clone(), Arc::new(MockSignalService::new()));

        adapter.join("session-1", "v=0 subscriber", true, "token-1").await;
        adapter.migrate("session-1", "v=0 subscriber", "token-1", "sfu-old").await;
        adapter.notify_leave("session-1", "user hung up").await;

        let sent = transport.sent_requests();
        assert_eq!(sent.len(), 3);
        match &sent[0] {
            SignalRequest::Join(join) => {
                assert!(join.fast_reconnect);
                assert!(join.migration.is_none());
                assert_eq!(join.token, "token-1");
            }
            other => panic!("unexpected request {:?}", other),
        }
        match &sent[1] {
            SignalRequest::Join(join) => {
                assert!(!join.fast_reconnect);
                assert_eq!(join.migration.as_ref().unwrap().from_sfu_id, "sfu-old");
            }
            other => panic!("unexpected request {:?}", other),
        }
        assert_eq!(
            sent[2],
            SignalRequest::LeaveCall(LeaveCallRequest {
                session_id: "session-1".into(),
                reason: "user hung up".into(),
            })
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_fire_and_forget_send_failure_is_swallowed() {
        let transport = Arc::new(MockSignalTransport::new("sfu"));
        transport.fail_sends(true);
        let adapter = adapter_with(transport.clone(), Arc::new(MockSignalService::new()));

        adapter.notify_leave("session-1", "bye").await;
        assert!(transport.sent_requests().is_empty());
        assert!(logs_contain("Failed to send signaling request"));
    }

    #[tokio::test]
    async fn test_ice_trickle_encodes_candidate() {
        let service = Arc::new(MockSignalService::new());
        let adapter = adapter_with(Arc::new(MockSignalTransport::new("sfu")), service.clone());

        let candidate = IceCandidate::new("candidate:1 1 udp 1 10.0.0.1 5000 typ host", Some("0".into()), 0);
        adapter
            .ice_trickle(&candidate, PeerType::PublisherUnspecified, "session-1")
            .await
            .unwrap();
        adapter
            .ice_trickle(&IceCandidate::new("", None, 0), PeerType::Subscriber, "session-1")
            .await
            .unwrap();

        let trickles = service.ice_trickles();
        assert_eq!(trickles.len(), 1);
        assert_eq!(trickles[0].peer_type, PeerType::PublisherUnspecified);
        assert_eq!(IceCandidate::from_json(&trickles[0].ice_candidate).unwrap().sdp, candidate.sdp);
    }

    #[tokio::test]
    async fn test_rpc_error_payload_is_surfaced() {
        let service = Arc::new(MockSignalService::new());
        service.set_response_error(SfuError {
            code: 400,
            message: "participant not found".into(),
            should_retry: false,
        });
        let adapter = adapter_with(Arc::new(MockSignalTransport::new("sfu")), service.clone());

        let result = adapter.send_answer("v=0", PeerType::Subscriber, "session-1").await;
        assert!(matches!(result, Err(SignalError::Rpc { code: 400, .. })));
    }

    #[tokio::test]
    async fn test_set_publisher_requires_connection() {
        let transport = Arc::new(MockSignalTransport::new("sfu"));
        let service = Arc::new(MockSignalService::new());
        let adapter = adapter_with(transport.clone(), service.clone());

        let result = adapter.set_publisher("v=0 offer", vec![], "session-1").await;
        assert!(matches!(result, Err(SignalError::NotConnected { .. })));
        assert!(service.set_publisher_requests().is_empty());
    }

    #[tokio::test]
    async fn test_set_publisher_retries_transient_failure() {
        let transport = Arc::new(MockSignalTransport::new("sfu"));
        let service = Arc::new(MockSignalService::new());
        service.set_publisher_response(SetPublisherResponse {
            sdp: "v=0 answer".into(),
            ..Default::default()
        });
        service.fail_next(SignalError::transport("socket reset"));
        let adapter = adapter_with(transport.clone(), service.clone());

        transport.set_state(ConnectionState::Connected);
        settle().await;

        let answer = adapter.set_publisher("v=0 offer", vec![], "session-1").await.unwrap();
        assert_eq!(answer, "v=0 answer");
        assert_eq!(service.set_publisher_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_error_events_update_reconnection_strategy() {
        let transport = Arc::new(MockSignalTransport::new("sfu"));
        let adapter = adapter_with(transport.clone(), Arc::new(MockSignalService::new()));
        assert_eq!(adapter.preferred_reconnection_strategy(), ReconnectionStrategy::Fast);

        transport.emit(SfuEvent::Error(SfuErrorEvent {
            error: SfuError {
                code: 700,
                message: "sfu shutting down".into(),
                should_retry: true,
            },
            reconnect_strategy: ReconnectionStrategy::Migrate,
        }));
        settle().await;

        assert_eq!(adapter.preferred_reconnection_strategy(), ReconnectionStrategy::Migrate);
    }

    #[tokio::test]
    async fn test_refresh_rebinds_transport_and_signals_observers() {
        let first = Arc::new(MockSignalTransport::new("sfu-1"));
        let adapter = adapter_with(first.clone(), Arc::new(MockSignalService::new()));
        let mut refresh_rx = adapter.subscribe_refresh();
        let mut events_rx = adapter.subscribe_events();

        let second = Arc::new(MockSignalTransport::new("sfu-2"));
        adapter.refresh(second.clone()).await;
        refresh_rx.recv().await.unwrap();

        assert_eq!(first.disconnect_calls(), 1);
        assert_eq!(adapter.hostname(), "sfu-2");

        second.emit(SfuEvent::CallEnded);
        assert_eq!(events_rx.recv().await.unwrap(), SfuEvent::CallEnded);
    }
}
