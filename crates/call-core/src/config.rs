//! Join input and retry configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vidcall_signal_core::CallSettings;

/// How often a failed join is retried and how long to wait in between
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRetryPolicy {
    /// Attempts made in total, including the first
    pub max_retries: u32,
    /// Delay before the first retry; doubles with every further retry
    pub base_delay: Duration,
    /// Upper bound of the delay
    pub max_delay: Duration,
}

impl Default for JoinRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl JoinRetryPolicy {
    /// Never retry
    pub fn none() -> Self {
        Self {
            max_retries: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (starting at 1)
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Parameters of a join
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JoinInput {
    /// Create the call if it does not exist
    pub create: bool,
    /// Ring the other members
    pub ring: bool,
    /// Notify the other members
    pub notify: bool,
    /// Settings to apply once joined
    pub call_settings: Option<CallSettings>,
    pub retry_policy: JoinRetryPolicy,
}
