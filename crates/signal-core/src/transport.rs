//! Collaborator interfaces for the SFU connection
//!
//! The persistent signaling socket and the request/response RPC service are
//! provided by the embedder; the session layer only depends on these traits.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::error::SignalResult;
use crate::messages::{
    IceRestartRequest, IceTrickleRequest, RpcResponse, SendAnswerRequest, SendStatsRequest,
    SetPublisherRequest, SetPublisherResponse, SfuEvent, SignalRequest, UpdateMuteStatesRequest,
    UpdateSubscriptionsRequest,
};
use crate::models::ConnectionState;

/// Persistent bidirectional connection to the SFU
#[async_trait]
pub trait SignalTransport: Send + Sync {
    /// Open the connection
    async fn connect(&self) -> SignalResult<()>;

    /// Close the connection
    async fn disconnect(&self, reason: &str);

    /// Send a framed message
    async fn send(&self, request: SignalRequest) -> SignalResult<()>;

    /// Connection state changes
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;

    /// Inbound SFU events
    fn events(&self) -> broadcast::Receiver<SfuEvent>;

    /// Host the transport is connected to
    fn hostname(&self) -> String;
}

/// Request/response RPC surface of the SFU
#[async_trait]
pub trait SignalService: Send + Sync {
    async fn set_publisher(&self, request: SetPublisherRequest) -> SignalResult<SetPublisherResponse>;

    async fn send_answer(&self, request: SendAnswerRequest) -> SignalResult<RpcResponse>;

    async fn ice_trickle(&self, request: IceTrickleRequest) -> SignalResult<RpcResponse>;

    async fn ice_restart(&self, request: IceRestartRequest) -> SignalResult<RpcResponse>;

    async fn update_subscriptions(&self, request: UpdateSubscriptionsRequest) -> SignalResult<RpcResponse>;

    async fn update_mute_states(&self, request: UpdateMuteStatesRequest) -> SignalResult<RpcResponse>;

    async fn send_stats(&self, request: SendStatsRequest) -> SignalResult<RpcResponse>;
}

/// Builds signaling transports for a given websocket endpoint
///
/// Used when (re)connecting to a new SFU after authentication or migration.
pub trait SignalTransportFactory: Send + Sync {
    fn make_transport(&self, ws_endpoint: &str, token: &str) -> SignalResult<Arc<dyn SignalTransport>>;
}

/// Creates the RPC service bound to one SFU
pub trait SignalServiceFactory: Send + Sync {
    fn make_service(&self, url: &str, token: &str) -> SignalResult<Arc<dyn SignalService>>;
}
