//! Backend operations of a call

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use vidcall_call_core::JoinInput;
use vidcall_signal_core::{JoinCallResponse, JoinResponseProvider};

/// Call operations served by the backend rather than the SFU
#[async_trait]
pub trait CallApi: Send + Sync {
    /// Join (and optionally create) the call, returning SFU credentials
    async fn join_call(&self, call_cid: &str, input: &JoinInput) -> anyhow::Result<JoinCallResponse>;

    async fn accept_call(&self, call_cid: &str) -> anyhow::Result<()>;

    async fn reject_call(&self, call_cid: &str, reason: Option<&str>) -> anyhow::Result<()>;
}

/// Join responses for the authentication adapter, built from the join in progress
pub(crate) struct JoinRequestProvider {
    api: Arc<dyn CallApi>,
    call_cid: String,
    input: Mutex<JoinInput>,
}

impl JoinRequestProvider {
    pub(crate) fn new(api: Arc<dyn CallApi>, call_cid: impl Into<String>) -> Self {
        Self {
            api,
            call_cid: call_cid.into(),
            input: Mutex::new(JoinInput::default()),
        }
    }

    pub(crate) fn set_input(&self, input: JoinInput) {
        *self.input.lock() = input;
    }
}

#[async_trait]
impl JoinResponseProvider for JoinRequestProvider {
    async fn join_call(&self) -> anyhow::Result<JoinCallResponse> {
        let input = self.input.lock().clone();
        self.api.join_call(&self.call_cid, &input).await
    }
}
