//! Statistics pipeline configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sampling and delivery cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// How often native statistics are sampled
    pub collection_interval: Duration,
    /// How often the latest sample is sent to the SFU; zero disables the timer
    pub delivery_interval: Duration,
    /// Delay between a publisher change and the delivery it triggers
    pub publisher_change_delay: Duration,
    /// Version reported alongside every delivery
    pub sdk_version: String,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            collection_interval: Duration::from_secs(2),
            delivery_interval: Duration::from_secs(5),
            publisher_change_delay: Duration::from_secs(3),
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
