//! Authentication Adapter
//!
//! Holds the credentials every outbound SFU request is built from and
//! refreshes them through an injected join-response provider.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::error::{SignalError, SignalResult};
use crate::models::{CallSettings, OwnCapability};

/// SFU server assigned to the call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SfuServer {
    pub url: String,
    pub ws_endpoint: String,
    pub edge_name: String,
}

/// ICE server handed out with the credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub password: String,
}

/// Credentials returned by the coordinator API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCredentials {
    pub server: SfuServer,
    pub token: String,
    pub ice_servers: Vec<IceServer>,
}

/// Response of the join-call API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinCallResponse {
    pub credentials: CallCredentials,
    pub own_capabilities: Vec<OwnCapability>,
    pub call_settings: CallSettings,
}

/// Supplies join responses, e.g. by calling the coordinator API
#[async_trait]
pub trait JoinResponseProvider: Send + Sync {
    async fn join_call(&self) -> anyhow::Result<JoinCallResponse>;
}

/// Credentials snapshot
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionCredentials {
    pub session_id: String,
    pub server_url: Option<Url>,
    pub hostname: String,
    pub ws_endpoint: String,
    pub token: String,
    pub api_key: String,
}

/// Owner of the session credentials
pub struct AuthenticationAdapter {
    provider: Arc<dyn JoinResponseProvider>,
    credentials: Mutex<SessionCredentials>,
}

impl AuthenticationAdapter {
    pub fn new(api_key: impl Into<String>, session_id: impl Into<String>, provider: Arc<dyn JoinResponseProvider>) -> Self {
        Self {
            provider,
            credentials: Mutex::new(SessionCredentials {
                session_id: session_id.into(),
                api_key: api_key.into(),
                ..Default::default()
            }),
        }
    }

    /// Fetch a join response and store the credentials it carries
    ///
    /// The url, hostname, websocket endpoint, token and (optionally) a freshly
    /// generated session id are written in a single critical section.
    pub async fn authenticate(&self, update_session: bool) -> SignalResult<JoinCallResponse> {
        let response = self
            .provider
            .join_call()
            .await
            .map_err(|e| SignalError::authentication(e.to_string()))?;

        let server = &response.credentials.server;
        let url = Url::parse(&server.url).map_err(|e| SignalError::invalid_url(&server.url, e.to_string()))?;
        let hostname = url
            .host_str()
            .ok_or_else(|| SignalError::invalid_url(&server.url, "missing host"))?
            .to_string();

        let rotated_session_id = update_session.then(|| Uuid::new_v4().to_string());

        {
            let mut credentials = self.credentials.lock();
            credentials.server_url = Some(url);
            credentials.hostname = hostname.clone();
            credentials.ws_endpoint = server.ws_endpoint.clone();
            credentials.token = response.credentials.token.clone();
            if let Some(session_id) = rotated_session_id.clone() {
                credentials.session_id = session_id;
            }
        }

        match rotated_session_id {
            Some(session_id) => info!(host = %hostname, session_id = %session_id, "Authenticated with new session"),
            None => debug!(host = %hostname, "Authenticated"),
        }
        Ok(response)
    }

    /// Consistent snapshot of all credentials
    pub fn credentials(&self) -> SessionCredentials {
        self.credentials.lock().clone()
    }

    pub fn session_id(&self) -> String {
        self.credentials.lock().session_id.clone()
    }

    pub fn token(&self) -> String {
        self.credentials.lock().token.clone()
    }

    pub fn hostname(&self) -> String {
        self.credentials.lock().hostname.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticJoinResponseProvider;

    fn response(url: &str, token: &str) -> JoinCallResponse {
        JoinCallResponse {
            credentials: CallCredentials {
                server: SfuServer {
                    url: url.into(),
                    ws_endpoint: "wss://sfu-a.example.com/ws".into(),
                    edge_name: "edge-a".into(),
                },
                token: token.into(),
                ice_servers: vec![],
            },
            own_capabilities: vec![OwnCapability::SendAudio],
            call_settings: CallSettings::default(),
        }
    }

    #[tokio::test]
    async fn test_authenticate_updates_credentials() {
        let provider = Arc::new(StaticJoinResponseProvider::new(response("https://sfu-a.example.com/twirp", "jwt-1")));
        let adapter = AuthenticationAdapter::new("key", "session-0", provider);

        adapter.authenticate(false).await.unwrap();

        let credentials = adapter.credentials();
        assert_eq!(credentials.hostname, "sfu-a.example.com");
        assert_eq!(credentials.token, "jwt-1");
        assert_eq!(credentials.ws_endpoint, "wss://sfu-a.example.com/ws");
        assert_eq!(credentials.session_id, "session-0");
        assert_eq!(credentials.api_key, "key");
    }

    #[tokio::test]
    async fn test_authenticate_rotates_session_id_on_request() {
        let provider = Arc::new(StaticJoinResponseProvider::new(response("https://sfu-a.example.com", "jwt-1")));
        let adapter = AuthenticationAdapter::new("key", "session-0", provider);

        adapter.authenticate(true).await.unwrap();
        let first = adapter.session_id();
        adapter.authenticate(true).await.unwrap();

        assert_ne!(first, "session-0");
        assert_ne!(first, adapter.session_id());
    }

    #[tokio::test]
    async fn test_malformed_url_leaves_credentials_untouched() {
        let provider = Arc::new(StaticJoinResponseProvider::new(response("not a url", "jwt-1")));
        let adapter = AuthenticationAdapter::new("key", "session-0", provider);

        let result = adapter.authenticate(true).await;

        assert!(matches!(result, Err(SignalError::InvalidUrl { .. })));
        assert_eq!(adapter.credentials().token, "");
        assert_eq!(adapter.session_id(), "session-0");
    }

    #[tokio::test]
    async fn test_provider_error_is_propagated() {
        let provider = Arc::new(StaticJoinResponseProvider::failing("coordinator unavailable"));
        let adapter = AuthenticationAdapter::new("key", "session-0", provider);

        let result = adapter.authenticate(false).await;
        assert_eq!(result, Err(SignalError::authentication("coordinator unavailable")));
    }
}
