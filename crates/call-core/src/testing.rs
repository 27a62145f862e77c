//! Scripted call actions

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use vidcall_signal_core::{CallCredentials, CallSettings, JoinCallResponse, SfuServer};

use crate::config::JoinInput;
use crate::machine::CallActions;
use crate::stage::{AcceptCallResponse, RejectCallResponse};

/// Join response pointing at a local SFU
pub fn join_response(token: &str) -> JoinCallResponse {
    JoinCallResponse {
        credentials: CallCredentials {
            server: SfuServer {
                url: "https://sfu.test/twirp".to_string(),
                ws_endpoint: "wss://sfu.test/ws".to_string(),
                edge_name: "sfu-test".to_string(),
            },
            token: token.to_string(),
            ice_servers: Vec::new(),
        },
        own_capabilities: Vec::new(),
        call_settings: CallSettings::default(),
    }
}

/// Call whose actions succeed unless told otherwise
pub struct MockCall {
    call_cid: String,
    accept_failure: Mutex<Option<String>>,
    reject_failure: Mutex<Option<String>>,
    join_failures: Mutex<(u32, String)>,
    join_delay: Mutex<Duration>,
    join_calls: AtomicU32,
    accept_calls: AtomicU32,
}

impl MockCall {
    pub fn new(call_cid: impl Into<String>) -> Self {
        Self {
            call_cid: call_cid.into(),
            accept_failure: Mutex::new(None),
            reject_failure: Mutex::new(None),
            join_failures: Mutex::new((0, String::new())),
            join_delay: Mutex::new(Duration::ZERO),
            join_calls: AtomicU32::new(0),
            accept_calls: AtomicU32::new(0),
        }
    }

    /// Fail the next accept
    pub fn fail_accept(&self, message: impl Into<String>) {
        *self.accept_failure.lock() = Some(message.into());
    }

    /// Fail the next reject
    pub fn fail_reject(&self, message: impl Into<String>) {
        *self.reject_failure.lock() = Some(message.into());
    }

    /// Fail the next `times` joins
    pub fn fail_joins(&self, times: u32, message: impl Into<String>) {
        *self.join_failures.lock() = (times, message.into());
    }

    pub fn set_join_delay(&self, delay: Duration) {
        *self.join_delay.lock() = delay;
    }

    pub fn join_calls(&self) -> u32 {
        self.join_calls.load(Ordering::SeqCst)
    }

    pub fn accept_calls(&self) -> u32 {
        self.accept_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallActions for MockCall {
    fn call_cid(&self) -> String {
        self.call_cid.clone()
    }

    async fn accept(&self) -> anyhow::Result<AcceptCallResponse> {
        self.accept_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.accept_failure.lock().take() {
            return Err(anyhow!(message));
        }
        Ok(AcceptCallResponse {
            call_cid: self.call_cid.clone(),
        })
    }

    async fn reject(&self, reason: Option<String>) -> anyhow::Result<RejectCallResponse> {
        if let Some(message) = self.reject_failure.lock().take() {
            return Err(anyhow!(message));
        }
        Ok(RejectCallResponse {
            call_cid: self.call_cid.clone(),
            reason,
        })
    }

    async fn join(&self, _input: &JoinInput) -> anyhow::Result<JoinCallResponse> {
        self.join_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.join_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failure = {
            let mut failures = self.join_failures.lock();
            if failures.0 > 0 {
                failures.0 -= 1;
                Some(failures.1.clone())
            } else {
                None
            }
        };
        match failure {
            Some(message) => Err(anyhow!(message)),
            None => Ok(join_response("token")),
        }
    }
}
