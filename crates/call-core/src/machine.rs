//! Call state machine
//!
//! Entering an executing stage (accepting, rejecting, joining) starts that
//! stage's action in the background. The action's outcome moves the machine
//! on: success to accepted, rejected or joined, failure through the
//! transient error stage back to idle. Requests the transition table does
//! not allow are refused and leave the stage untouched.
//!
//! The machine refers to its call weakly. If the call is gone by the time
//! an action would run, the action is skipped and the pending outcome
//! resolves with [`CallError::CallReleased`].

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, error, info, warn};
use vidcall_infra_common::DisposableBag;
use vidcall_signal_core::JoinCallResponse;

use crate::config::JoinInput;
use crate::error::{CallError, CallResult};
use crate::stage::{AcceptCallResponse, CallStage, RejectCallResponse, StageId, StageTransition};

/// Actions a call performs on behalf of its stages
#[async_trait]
pub trait CallActions: Send + Sync {
    /// `type:id` of the call, used in logs
    fn call_cid(&self) -> String;

    async fn accept(&self) -> anyhow::Result<AcceptCallResponse>;

    async fn reject(&self, reason: Option<String>) -> anyhow::Result<RejectCallResponse>;

    async fn join(&self, input: &JoinInput) -> anyhow::Result<JoinCallResponse>;
}

/// Result of a stage action, resolved once the action finishes
pub struct StageOutcome<T> {
    stage: StageId,
    rx: oneshot::Receiver<CallResult<T>>,
}

impl<T> Future for StageOutcome<T> {
    type Output = CallResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let stage = self.stage;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(CallError::call_released(stage))))
    }
}

pub struct CallStateMachine {
    call: Weak<dyn CallActions>,
    call_cid: String,
    stage: watch::Sender<CallStage>,
    transitions: broadcast::Sender<StageTransition>,
    bag: DisposableBag,
}

impl CallStateMachine {
    /// Create a machine in the idle stage
    pub fn new<C: CallActions + 'static>(call: &Arc<C>) -> Arc<Self> {
        let call_cid = call.call_cid();
        let weak: Weak<C> = Arc::downgrade(call);
        let weak: Weak<dyn CallActions> = weak;
        let (stage, _) = watch::channel(CallStage::Idle);
        let (transitions, _) = broadcast::channel(32);

        Arc::new(Self {
            call: weak,
            bag: DisposableBag::new(format!("call-stage-{}", call_cid)),
            call_cid,
            stage,
            transitions,
        })
    }

    pub fn stage(&self) -> CallStage {
        self.stage.borrow().clone()
    }

    pub fn stage_id(&self) -> StageId {
        self.stage.borrow().id()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallStage> {
        self.stage.subscribe()
    }

    /// Every accepted transition, in order
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StageTransition> {
        self.transitions.subscribe()
    }

    /// Accept an incoming call; `None` when the current stage cannot accept
    pub fn accept(self: &Arc<Self>) -> Option<StageOutcome<AcceptCallResponse>> {
        if !self.transition(CallStage::Accepting) {
            return None;
        }

        let (tx, rx) = oneshot::channel();
        let machine = Arc::downgrade(self);
        let call = self.call.clone();

        self.bag.spawn_keyed("accepting", async move {
            let Some(call) = call.upgrade() else {
                debug!("Call released; skipping accept");
                return;
            };
            let result = call.accept().await;
            drop(call);

            let Some(machine) = machine.upgrade() else {
                return;
            };
            match result {
                Ok(response) => {
                    machine.transition(CallStage::Accepted(response.clone()));
                    let _ = tx.send(Ok(response));
                }
                Err(e) => {
                    let error = CallError::action_failed(StageId::Accepting, &e);
                    machine.fail(error.clone());
                    let _ = tx.send(Err(error));
                }
            }
        });

        Some(StageOutcome {
            stage: StageId::Accepting,
            rx,
        })
    }

    /// Reject an incoming call; `None` when the current stage cannot reject
    pub fn reject(self: &Arc<Self>, reason: Option<String>) -> Option<StageOutcome<RejectCallResponse>> {
        if !self.transition(CallStage::Rejecting { reason: reason.clone() }) {
            return None;
        }

        let (tx, rx) = oneshot::channel();
        let machine = Arc::downgrade(self);
        let call = self.call.clone();

        self.bag.spawn_keyed("rejecting", async move {
            let Some(call) = call.upgrade() else {
                debug!("Call released; skipping reject");
                return;
            };
            let result = call.reject(reason).await;
            drop(call);

            let Some(machine) = machine.upgrade() else {
                return;
            };
            match result {
                Ok(response) => {
                    machine.transition(CallStage::Rejected(response.clone()));
                    let _ = tx.send(Ok(response));
                }
                Err(e) => {
                    let error = CallError::action_failed(StageId::Rejecting, &e);
                    machine.fail(error.clone());
                    let _ = tx.send(Err(error));
                }
            }
        });

        Some(StageOutcome {
            stage: StageId::Rejecting,
            rx,
        })
    }

    /// Join the call; `None` when the current stage cannot join
    ///
    /// A failed join is retried per `input.retry_policy`. Each retry
    /// re-enters the joining stage.
    pub fn join(self: &Arc<Self>, input: JoinInput) -> Option<StageOutcome<JoinCallResponse>> {
        if !self.transition(CallStage::Joining { attempt: 0 }) {
            return None;
        }

        let (tx, rx) = oneshot::channel();
        self.bag.spawn_keyed(
            "joining",
            run_join(Arc::downgrade(self), self.call.clone(), input, tx),
        );

        Some(StageOutcome {
            stage: StageId::Joining,
            rx,
        })
    }

    /// Move to `next` if the transition table allows it
    fn transition(&self, next: CallStage) -> bool {
        let to = next.id();
        let mut from = None;

        self.stage.send_if_modified(|current| {
            let current_id = current.id();
            if current_id.can_transition_to(to) {
                from = Some(current_id);
                *current = next;
                true
            } else {
                false
            }
        });

        match from {
            Some(from) => {
                info!(call_cid = %self.call_cid, %from, %to, "Call stage changed");
                let _ = self.transitions.send(StageTransition { from, to });
                true
            }
            None => {
                debug!(call_cid = %self.call_cid, current = %self.stage_id(), %to, "Refused call stage transition");
                false
            }
        }
    }

    /// Pass through the error stage back to idle
    fn fail(&self, failure: CallError) {
        error!(call_cid = %self.call_cid, error = %failure, "Call stage failed");
        if self.transition(CallStage::Error(failure)) {
            self.transition(CallStage::Idle);
        }
    }
}

async fn run_join(
    machine: Weak<CallStateMachine>,
    call: Weak<dyn CallActions>,
    input: JoinInput,
    delivery: oneshot::Sender<CallResult<JoinCallResponse>>,
) {
    let mut retries = 0u32;

    loop {
        let Some(current_call) = call.upgrade() else {
            debug!("Call released; skipping join");
            return;
        };
        debug!(call_cid = %current_call.call_cid(), attempt = retries, ?input, "Joining call");
        let result = current_call.join(&input).await;
        drop(current_call);

        let Some(current_machine) = machine.upgrade() else {
            return;
        };

        let failure = match result {
            Ok(response) => {
                current_machine.transition(CallStage::Joined(Box::new(response.clone())));
                let _ = delivery.send(Ok(response));
                return;
            }
            Err(e) => CallError::action_failed(StageId::Joining, &e),
        };

        retries += 1;
        if retries >= input.retry_policy.max_retries {
            current_machine.fail(failure.clone());
            let _ = delivery.send(Err(failure));
            return;
        }

        let delay = input.retry_policy.delay(retries);
        warn!(
            call_cid = %current_machine.call_cid,
            retries,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "Join failed; retrying"
        );
        drop(current_machine);
        tokio::time::sleep(delay).await;

        let Some(current_machine) = machine.upgrade() else {
            return;
        };
        if !current_machine.transition(CallStage::Joining { attempt: retries }) {
            let _ = delivery.send(Err(failure));
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::JoinRetryPolicy;
    use crate::testing::MockCall;
    use pretty_assertions::assert_eq;

    fn drain(rx: &mut broadcast::Receiver<StageTransition>) -> Vec<(StageId, StageId)> {
        let mut seen = Vec::new();
        while let Ok(t) = rx.try_recv() {
            seen.push((t.from, t.to));
        }
        seen
    }

    fn fast_retries(max_retries: u32) -> JoinInput {
        JoinInput {
            retry_policy: JoinRetryPolicy {
                max_retries,
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
            },
            ..JoinInput::default()
        }
    }

    #[tokio::test]
    async fn test_accept_then_join_reaches_joined() {
        let call = Arc::new(MockCall::new("default:accept"));
        let machine = CallStateMachine::new(&call);
        let mut transitions = machine.subscribe_transitions();

        let accepted = machine.accept().unwrap().await.unwrap();
        assert_eq!(accepted.call_cid, "default:accept");
        assert_eq!(machine.stage_id(), StageId::Accepted);

        machine.join(JoinInput::default()).unwrap().await.unwrap();
        assert_eq!(machine.stage_id(), StageId::Joined);

        use StageId::*;
        assert_eq!(
            drain(&mut transitions),
            vec![(Idle, Accepting), (Accepting, Accepted), (Accepted, Joining), (Joining, Joined)]
        );
    }

    #[tokio::test]
    async fn test_failed_join_passes_through_error_to_idle() {
        let call = Arc::new(MockCall::new("default:fail"));
        call.fail_joins(1, "sfu unavailable");
        let machine = CallStateMachine::new(&call);
        let mut transitions = machine.subscribe_transitions();

        let result = machine.join(fast_retries(1)).unwrap().await;

        assert!(matches!(result, Err(CallError::ActionFailed { stage: StageId::Joining, .. })));
        assert_eq!(machine.stage_id(), StageId::Idle);
        use StageId::*;
        assert_eq!(
            drain(&mut transitions),
            vec![(Idle, Joining), (Joining, Error), (Error, Idle)]
        );
    }

    #[tokio::test]
    async fn test_join_retries_until_success() {
        let call = Arc::new(MockCall::new("default:retry"));
        call.fail_joins(2, "flaky");
        let machine = CallStateMachine::new(&call);
        let mut transitions = machine.subscribe_transitions();

        machine.join(fast_retries(3)).unwrap().await.unwrap();

        assert_eq!(call.join_calls(), 3);
        assert_eq!(machine.stage_id(), StageId::Joined);
        use StageId::*;
        assert_eq!(
            drain(&mut transitions),
            vec![(Idle, Joining), (Joining, Joining), (Joining, Joining), (Joining, Joined)]
        );
    }

    #[tokio::test]
    async fn test_join_gives_up_after_max_retries() {
        let call = Arc::new(MockCall::new("default:give-up"));
        call.fail_joins(5, "down");
        let machine = CallStateMachine::new(&call);

        let result = machine.join(fast_retries(2)).unwrap().await;

        assert!(result.is_err());
        assert_eq!(call.join_calls(), 2);
        assert_eq!(machine.stage_id(), StageId::Idle);
    }

    #[tokio::test]
    async fn test_illegal_requests_are_refused() {
        let call = Arc::new(MockCall::new("default:refuse"));
        call.set_join_delay(Duration::from_millis(50));
        let machine = CallStateMachine::new(&call);

        let joining = machine.join(JoinInput::default()).unwrap();
        assert!(machine.accept().is_none());
        assert!(machine.reject(None).is_none());
        assert_eq!(machine.stage_id(), StageId::Joining);

        joining.await.unwrap();
        assert!(machine.accept().is_none());
        assert_eq!(machine.stage_id(), StageId::Joined);
    }

    #[tokio::test]
    async fn test_reject_reaches_rejected_and_blocks_join() {
        let call = Arc::new(MockCall::new("default:reject"));
        let machine = CallStateMachine::new(&call);

        let response = machine.reject(Some("busy".into())).unwrap().await.unwrap();

        assert_eq!(response.reason.as_deref(), Some("busy"));
        assert_eq!(machine.stage_id(), StageId::Rejected);
        assert!(machine.join(JoinInput::default()).is_none());
    }

    #[tokio::test]
    async fn test_failed_accept_returns_to_idle() {
        let call = Arc::new(MockCall::new("default:accept-fail"));
        call.fail_accept("declined by server");
        let machine = CallStateMachine::new(&call);

        let result = machine.accept().unwrap().await;

        assert!(result.is_err());
        assert_eq!(machine.stage_id(), StageId::Idle);
        assert!(machine.accept().is_some());
    }

    #[tokio::test]
    async fn test_released_call_is_a_no_op() {
        let call = Arc::new(MockCall::new("default:gone"));
        let machine = CallStateMachine::new(&call);
        drop(call);

        let result = machine.join(JoinInput::default()).unwrap().await;

        assert_eq!(result, Err(CallError::call_released(StageId::Joining)));
        assert_eq!(machine.stage_id(), StageId::Joining);
    }
}
