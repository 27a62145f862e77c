//! ICE Adapter
//!
//! Trickles ICE candidates in both directions for one side of the call.
//! Candidates generated before signaling is connected wait in the pending
//! local queue; candidates received before the native connection has a
//! remote description wait in the pending SFU queue. All work for one
//! adapter runs on a single processing task, so draining a queue never
//! interleaves with enqueuing into it. The processing task outlives SFU
//! refreshes; only the observers feeding it are rebuilt.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use vidcall_infra_common::{DisposableBag, RetryPolicy, retry_with_policy};
use vidcall_signal_core::{IceCandidate, PeerConnectionType, SfuAdapter, SfuEvent};

use crate::native::PeerConnection;
use crate::types::PeerConnectionEvent;

/// ICE adapter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceAdapterConfig {
    /// Retry policy for adding a remote candidate to the native connection
    pub add_candidate_retry: RetryPolicy,
}

impl Default for IceAdapterConfig {
    fn default() -> Self {
        Self {
            add_candidate_retry: RetryPolicy::fast(),
        }
    }
}

#[derive(Debug)]
enum IceCommand {
    LocalCandidate(IceCandidate),
    RemoteCandidate(IceCandidate),
    SignalingConnected,
    RemoteDescriptionAvailable,
}

#[derive(Debug, Default)]
struct PendingCandidates {
    local: Vec<IceCandidate>,
    sfu: Vec<IceCandidate>,
}

struct IceAdapterInner {
    session_id: String,
    peer_type: PeerConnectionType,
    peer_connection: Arc<dyn PeerConnection>,
    sfu_adapter: Arc<SfuAdapter>,
    /// Coordinator event stream (native events plus `HasRemoteDescription`)
    events: broadcast::Sender<PeerConnectionEvent>,
    config: IceAdapterConfig,
    pending: Mutex<PendingCandidates>,
    commands: mpsc::UnboundedSender<IceCommand>,
    /// Observers feeding `commands`; rebuilt on every refresh
    bag: DisposableBag,
    processor: DisposableBag,
}

/// Bidirectional ICE candidate trickling for one peer connection
pub struct IceAdapter {
    inner: Arc<IceAdapterInner>,
    refresh_bag: DisposableBag,
}

impl IceAdapter {
    /// Create an adapter and start observing
    ///
    /// `events` is the coordinator's event channel.
    pub fn new(
        session_id: impl Into<String>,
        peer_type: PeerConnectionType,
        peer_connection: Arc<dyn PeerConnection>,
        sfu_adapter: Arc<SfuAdapter>,
        events: broadcast::Sender<PeerConnectionEvent>,
        config: IceAdapterConfig,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(IceAdapterInner {
            session_id: session_id.into(),
            peer_type,
            peer_connection,
            sfu_adapter,
            events,
            config,
            pending: Mutex::new(PendingCandidates::default()),
            commands,
            bag: DisposableBag::new(format!("ice-adapter-{}", peer_type)),
            processor: DisposableBag::new(format!("ice-adapter-processor-{}", peer_type)),
        });
        inner.spawn_processor(command_rx);

        let adapter = Self {
            inner,
            refresh_bag: DisposableBag::new(format!("ice-adapter-refresh-{}", peer_type)),
        };
        adapter.inner.configure();
        adapter.observe_refresh();
        adapter
    }

    pub fn peer_type(&self) -> PeerConnectionType {
        self.inner.peer_type
    }

    /// Candidates waiting for signaling to connect
    pub fn pending_local_count(&self) -> usize {
        self.inner.pending.lock().local.len()
    }

    /// Candidates waiting for a remote description
    pub fn pending_sfu_count(&self) -> usize {
        self.inner.pending.lock().sfu.len()
    }

    /// Cancel every subscription of this adapter
    pub fn stop_observing(&self) {
        debug!(peer_type = %self.inner.peer_type, "ICE adapter stopped observing");
        self.refresh_bag.cancel_all();
        self.inner.bag.cancel_all();
        self.inner.processor.cancel_all();
    }

    fn observe_refresh(&self) {
        let mut refresh_rx = self.inner.sfu_adapter.subscribe_refresh();
        let weak = Arc::downgrade(&self.inner);
        self.refresh_bag.spawn_keyed("refresh", async move {
            loop {
                match refresh_rx.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        let Some(inner) = weak.upgrade() else { break };
                        info!(peer_type = %inner.peer_type, "Signaling refreshed, rebuilding ICE subscriptions");
                        inner.configure();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

impl Drop for IceAdapter {
    fn drop(&mut self) {
        self.stop_observing();
    }
}

impl std::fmt::Debug for IceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IceAdapter")
            .field("peer_type", &self.inner.peer_type)
            .field("session_id", &self.inner.session_id)
            .field("pending", &*self.inner.pending.lock())
            .finish()
    }
}

impl IceAdapterInner {
    /// Tear down and rebuild every observer; queued work is kept
    fn configure(self: &Arc<Self>) {
        self.bag.cancel_all();

        self.observe_peer_connection(self.commands.clone());
        self.observe_sfu_events(self.commands.clone());
        self.observe_connection_state(self.commands.clone());
    }

    fn spawn_processor(self: &Arc<Self>, mut command_rx: mpsc::UnboundedReceiver<IceCommand>) {
        let weak = Arc::downgrade(self);
        self.processor.spawn_keyed("processor", async move {
            while let Some(command) = command_rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                inner.handle(command).await;
            }
        });
    }

    fn observe_peer_connection(self: &Arc<Self>, command_tx: mpsc::UnboundedSender<IceCommand>) {
        let mut events_rx = self.events.subscribe();
        let peer_type = self.peer_type;
        self.bag.spawn_keyed("peer-connection-events", async move {
            loop {
                let command = match events_rx.recv().await {
                    Ok(PeerConnectionEvent::DidGenerateIceCandidate(candidate)) => IceCommand::LocalCandidate(candidate),
                    Ok(PeerConnectionEvent::HasRemoteDescription(_)) => IceCommand::RemoteDescriptionAvailable,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(peer_type = %peer_type, skipped = skipped, "ICE adapter lagged behind peer connection events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if command_tx.send(command).is_err() {
                    break;
                }
            }
        });
    }

    fn observe_sfu_events(self: &Arc<Self>, command_tx: mpsc::UnboundedSender<IceCommand>) {
        let mut events_rx = self.sfu_adapter.subscribe_events();
        let peer_type = self.peer_type;
        self.bag.spawn_keyed("sfu-events", async move {
            loop {
                match events_rx.recv().await {
                    Ok(SfuEvent::IceTrickle(trickle)) => {
                        if PeerConnectionType::from(trickle.peer_type) != peer_type {
                            continue;
                        }
                        match IceCandidate::from_json(&trickle.ice_candidate) {
                            Ok(candidate) => {
                                if command_tx.send(IceCommand::RemoteCandidate(candidate)).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(peer_type = %peer_type, error = %e, "Dropping undecodable ICE trickle"),
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(peer_type = %peer_type, skipped = skipped, "ICE adapter lagged behind SFU events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    fn observe_connection_state(self: &Arc<Self>, command_tx: mpsc::UnboundedSender<IceCommand>) {
        let mut state_rx = self.sfu_adapter.subscribe_connection_state();
        self.bag.spawn_keyed("connection-state", async move {
            let mut was_connected = false;
            loop {
                let connected = state_rx.borrow_and_update().is_connected();
                if connected && !was_connected && command_tx.send(IceCommand::SignalingConnected).is_err() {
                    break;
                }
                was_connected = connected;
                if state_rx.changed().await.is_err() {
                    break;
                }
            }
        });
    }

    async fn handle(&self, command: IceCommand) {
        match command {
            IceCommand::LocalCandidate(candidate) => {
                if self.sfu_adapter.is_connected() {
                    self.trickle(&candidate).await;
                } else {
                    debug!(peer_type = %self.peer_type, "Signaling not connected, queueing local ICE candidate");
                    self.pending.lock().local.push(candidate);
                }
            }
            IceCommand::SignalingConnected => self.drain_local().await,
            IceCommand::RemoteCandidate(candidate) => {
                if self.peer_connection.remote_description().is_some() {
                    self.add(&candidate).await;
                } else {
                    debug!(peer_type = %self.peer_type, "No remote description yet, queueing SFU ICE candidate");
                    self.pending.lock().sfu.push(candidate);
                }
            }
            IceCommand::RemoteDescriptionAvailable => self.drain_sfu().await,
        }
    }

    async fn drain_local(&self) {
        let candidates = std::mem::take(&mut self.pending.lock().local);
        if candidates.is_empty() {
            return;
        }
        debug!(peer_type = %self.peer_type, count = candidates.len(), "Draining pending local ICE candidates");
        for candidate in candidates {
            if self.sfu_adapter.is_connected() {
                self.trickle(&candidate).await;
            } else {
                self.pending.lock().local.push(candidate);
            }
        }
    }

    async fn drain_sfu(&self) {
        let candidates = std::mem::take(&mut self.pending.lock().sfu);
        if candidates.is_empty() {
            return;
        }
        debug!(peer_type = %self.peer_type, count = candidates.len(), "Draining pending SFU ICE candidates");
        join_all(candidates.iter().map(|candidate| self.add(candidate))).await;
    }

    async fn trickle(&self, candidate: &IceCandidate) {
        if let Err(e) = self
            .sfu_adapter
            .ice_trickle(candidate, self.peer_type.peer_type(), &self.session_id)
            .await
        {
            error!(peer_type = %self.peer_type, error = %e, "Failed to trickle ICE candidate");
        }
    }

    async fn add(&self, candidate: &IceCandidate) {
        let result = retry_with_policy("add_ice_candidate", &self.config.add_candidate_retry, || {
            self.peer_connection.add_ice_candidate(candidate)
        })
        .await;
        match result {
            Ok(()) => debug!(peer_type = %self.peer_type, "Added remote ICE candidate"),
            Err(e) => error!(peer_type = %self.peer_type, error = %e, "Failed to add remote ICE candidate"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PeerError;
    use crate::testing::MockPeerConnection;
    use std::time::Duration;
    use tokio::time::sleep;
    use vidcall_signal_core::messages::IceTrickle;
    use vidcall_signal_core::testing::{MockSignalService, MockSignalTransport};
    use vidcall_signal_core::{ClientDetails, ConnectionState, PeerType, SessionDescription, SfuAdapterConfig};

    struct Fixture {
        transport: Arc<MockSignalTransport>,
        service: Arc<MockSignalService>,
        sfu: Arc<SfuAdapter>,
        pc: Arc<MockPeerConnection>,
        events: broadcast::Sender<PeerConnectionEvent>,
        adapter: IceAdapter,
    }

    fn fixture(peer_type: PeerConnectionType) -> Fixture {
        fixture_with(
            peer_type,
            IceAdapterConfig {
                add_candidate_retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)),
            },
        )
    }

    fn fixture_with(peer_type: PeerConnectionType, config: IceAdapterConfig) -> Fixture {
        let transport = Arc::new(MockSignalTransport::new("sfu"));
        let service = Arc::new(MockSignalService::new());
        let sfu = Arc::new(SfuAdapter::new(
            transport.clone(),
            service.clone(),
            SfuAdapterConfig::default(),
            ClientDetails::default(),
        ));
        let pc = Arc::new(MockPeerConnection::new());
        let (events, _) = broadcast::channel(64);
        let adapter = IceAdapter::new("session-1", peer_type, pc.clone(), sfu.clone(), events.clone(), config);
        Fixture {
            transport,
            service,
            sfu,
            pc,
            events,
            adapter,
        }
    }

    fn candidate(n: u32) -> IceCandidate {
        IceCandidate::new(format!("candidate:{} 1 udp 1 10.0.0.{} 5000 typ host", n, n), Some("0".into()), 0)
    }

    fn trickle_event(peer_type: PeerType, candidate: &IceCandidate) -> SfuEvent {
        SfuEvent::IceTrickle(IceTrickle {
            peer_type,
            ice_candidate: candidate.to_json().unwrap(),
            session_id: "session-1".into(),
        })
    }

    async fn settle() {
        sleep(Duration::from_millis(30)).await;
    }

    #[tokio::test]
    async fn test_local_candidates_wait_for_signaling() {
        let f = fixture(PeerConnectionType::Publisher);
        f.transport.set_state(ConnectionState::Connecting);
        settle().await;

        f.events.send(PeerConnectionEvent::DidGenerateIceCandidate(candidate(1))).unwrap();
        f.events.send(PeerConnectionEvent::DidGenerateIceCandidate(candidate(2))).unwrap();
        settle().await;

        assert!(f.service.ice_trickles().is_empty());
        assert_eq!(f.adapter.pending_local_count(), 2);

        f.transport.set_state(ConnectionState::Connected);
        settle().await;

        let sent: Vec<String> = f
            .service
            .ice_trickles()
            .iter()
            .map(|t| IceCandidate::from_json(&t.ice_candidate).unwrap().sdp)
            .collect();
        assert_eq!(sent, vec![candidate(1).sdp, candidate(2).sdp]);
        assert_eq!(f.adapter.pending_local_count(), 0);

        // A reconnect must not resend drained candidates
        f.transport.set_state(ConnectionState::Disconnected { reason: None });
        settle().await;
        f.transport.set_state(ConnectionState::Connected);
        settle().await;
        assert_eq!(f.service.ice_trickles().len(), 2);
    }

    #[tokio::test]
    async fn test_local_candidate_trickled_immediately_when_connected() {
        let f = fixture(PeerConnectionType::Subscriber);
        f.transport.set_state(ConnectionState::Connected);
        settle().await;

        f.events.send(PeerConnectionEvent::DidGenerateIceCandidate(candidate(7))).unwrap();
        settle().await;

        let trickles = f.service.ice_trickles();
        assert_eq!(trickles.len(), 1);
        assert_eq!(trickles[0].peer_type, PeerType::Subscriber);
        assert_eq!(trickles[0].session_id, "session-1");
    }

    #[tokio::test]
    async fn test_remote_candidates_wait_for_remote_description() {
        let f = fixture(PeerConnectionType::Subscriber);

        f.transport.emit(trickle_event(PeerType::Subscriber, &candidate(1)));
        f.transport.emit(trickle_event(PeerType::Subscriber, &candidate(2)));
        settle().await;

        assert!(f.pc.added_candidates().is_empty());
        assert_eq!(f.adapter.pending_sfu_count(), 2);

        let offer = SessionDescription::offer("v=0 offer");
        f.pc.set_remote_description_value(Some(offer.clone()));
        f.events.send(PeerConnectionEvent::HasRemoteDescription(offer)).unwrap();
        settle().await;

        let mut added: Vec<String> = f.pc.added_candidates().into_iter().map(|c| c.sdp).collect();
        added.sort();
        assert_eq!(added, vec![candidate(1).sdp, candidate(2).sdp]);
        assert_eq!(f.adapter.pending_sfu_count(), 0);

        f.transport.emit(trickle_event(PeerType::Subscriber, &candidate(3)));
        settle().await;
        assert_eq!(f.pc.added_candidates().len(), 3);
    }

    #[tokio::test]
    async fn test_trickles_for_other_side_are_ignored() {
        let f = fixture(PeerConnectionType::Publisher);
        f.pc.set_remote_description_value(Some(SessionDescription::answer("v=0 answer")));

        f.transport.emit(trickle_event(PeerType::Subscriber, &candidate(1)));
        settle().await;

        assert!(f.pc.added_candidates().is_empty());
        assert_eq!(f.adapter.pending_sfu_count(), 0);
    }

    #[tokio::test]
    async fn test_add_candidate_is_retried() {
        let f = fixture(PeerConnectionType::Subscriber);
        f.pc.set_remote_description_value(Some(SessionDescription::offer("v=0 offer")));
        f.pc.fail_add_candidate(2, PeerError::native("add_ice_candidate", "renegotiating"));

        f.transport.emit(trickle_event(PeerType::Subscriber, &candidate(1)));
        settle().await;

        assert_eq!(f.pc.add_candidate_attempts(), 3);
        assert_eq!(f.pc.added_candidates().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_observing_cancels_subscriptions() {
        let f = fixture(PeerConnectionType::Publisher);
        f.transport.set_state(ConnectionState::Connected);
        settle().await;

        f.adapter.stop_observing();
        f.events.send(PeerConnectionEvent::DidGenerateIceCandidate(candidate(1))).ok();
        settle().await;

        assert!(f.service.ice_trickles().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_rebuilds_without_duplicate_delivery() {
        let f = fixture(PeerConnectionType::Subscriber);
        f.pc.set_remote_description_value(Some(SessionDescription::offer("v=0 offer")));

        let second = Arc::new(MockSignalTransport::new("sfu-2"));
        f.sfu.refresh(second.clone()).await;
        settle().await;

        second.emit(trickle_event(PeerType::Subscriber, &candidate(4)));
        settle().await;

        assert_eq!(f.pc.added_candidates().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_during_drain_keeps_candidates() {
        let f = fixture_with(
            PeerConnectionType::Subscriber,
            IceAdapterConfig {
                add_candidate_retry: RetryPolicy::new(3, Duration::from_millis(100), Duration::from_millis(150)),
            },
        );
        f.transport.emit(trickle_event(PeerType::Subscriber, &candidate(1)));
        f.transport.emit(trickle_event(PeerType::Subscriber, &candidate(2)));
        settle().await;
        assert_eq!(f.adapter.pending_sfu_count(), 2);

        f.pc.fail_add_candidate(2, PeerError::native("add_ice_candidate", "renegotiating"));
        let offer = SessionDescription::offer("v=0 offer");
        f.pc.set_remote_description_value(Some(offer.clone()));
        f.events.send(PeerConnectionEvent::HasRemoteDescription(offer)).unwrap();
        sleep(Duration::from_millis(20)).await;

        f.sfu.refresh(Arc::new(MockSignalTransport::new("sfu-2"))).await;
        sleep(Duration::from_millis(300)).await;

        let mut added: Vec<String> = f.pc.added_candidates().into_iter().map(|c| c.sdp).collect();
        added.sort();
        assert_eq!(added, vec![candidate(1).sdp, candidate(2).sdp]);
        assert_eq!(f.pc.add_candidate_attempts(), 4);
        assert_eq!(f.adapter.pending_sfu_count(), 0);
    }
}
