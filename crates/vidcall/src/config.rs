//! Session-wide configuration
//!
//! [`SessionConfig`] gathers the configuration of every component so a
//! whole session can be described in one JSON document. Missing sections
//! fall back to their defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vidcall_audio_core::{AudioSessionConfiguration, AudioStoreConfig, WebRtcAudioDefaults};
use vidcall_call_core::JoinRetryPolicy;
use vidcall_infra_common::{LoggingConfig, setup_logging};
use vidcall_peer_core::CoordinatorConfig;
use vidcall_signal_core::{ClientDetails, SfuAdapterConfig};
use vidcall_stats_core::StatsConfig;

use crate::error::{SessionError, SessionResult};

/// Configuration of one call session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// API key the credentials are issued for
    pub api_key: String,
    pub client_details: ClientDetails,
    pub logging: LoggingConfig,
    pub sfu: SfuAdapterConfig,
    pub coordinator: CoordinatorConfig,
    pub join_retry: JoinRetryPolicy,
    pub stats: StatsConfig,
    pub audio: AudioStoreConfig,
    /// Seed of the process-wide WebRTC audio session defaults
    pub audio_session: AudioSessionConfiguration,
    /// How long connecting the signaling transport may take
    pub connect_timeout: Duration,
    /// How long the SFU may take to answer a join request
    pub join_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            client_details: ClientDetails::default(),
            logging: LoggingConfig::default(),
            sfu: SfuAdapterConfig::default(),
            coordinator: CoordinatorConfig::default(),
            join_retry: JoinRetryPolicy::default(),
            stats: StatsConfig::default(),
            audio: AudioStoreConfig::default(),
            audio_session: AudioSessionConfiguration::default(),
            connect_timeout: Duration::from_secs(10),
            join_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON text
    pub fn from_json(json: &str) -> SessionResult<Self> {
        serde_json::from_str(json).map_err(|e| SessionError::config(format!("invalid session config: {}", e)))
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> SessionResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SessionError::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&contents)
    }

    /// Fresh WebRTC audio defaults seeded from [`audio_session`](Self::audio_session)
    pub fn audio_defaults(&self) -> WebRtcAudioDefaults {
        WebRtcAudioDefaults::new(self.audio_session)
    }

    /// Install the global tracing subscriber described by [`logging`](Self::logging)
    pub fn install_logging(&self) -> SessionResult<()> {
        setup_logging(self.logging.clone())?;
        Ok(())
    }

    pub fn to_json(&self) -> SessionResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SessionError::config(e.to_string()))
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_stats(mut self, stats: StatsConfig) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_join_retry(mut self, join_retry: JoinRetryPolicy) -> Self {
        self.join_retry = join_retry;
        self
    }

    pub fn with_timeouts(mut self, connect_timeout: Duration, join_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.join_timeout = join_timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = SessionConfig::from_json("{}").unwrap();
        assert_eq!(config.stats, StatsConfig::default());
        assert_eq!(config.join_retry, JoinRetryPolicy::default());
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = SessionConfig::from_json(
            r#"{
                "api_key": "key-1",
                "stats": {"delivery_interval": {"secs": 15, "nanos": 0}},
                "join_timeout": {"secs": 3, "nanos": 0}
            }"#,
        )
        .unwrap();

        assert_eq!(config.api_key, "key-1");
        assert_eq!(config.stats.delivery_interval, Duration::from_secs(15));
        assert_eq!(config.stats.collection_interval, Duration::from_secs(2));
        assert_eq!(config.join_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_round_trip_through_json() {
        let config = SessionConfig::new("key-2").with_timeouts(Duration::from_secs(1), Duration::from_secs(2));
        let parsed = SessionConfig::from_json(&config.to_json().unwrap()).unwrap();

        assert_eq!(parsed.api_key, "key-2");
        assert_eq!(parsed.connect_timeout, Duration::from_secs(1));
        assert_eq!(parsed.sfu, config.sfu);
        assert_eq!(parsed.audio, config.audio);
    }

    #[test]
    fn test_malformed_json_is_a_config_error() {
        assert!(matches!(
            SessionConfig::from_json("{not json"),
            Err(SessionError::Config { .. })
        ));
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        let config = SessionConfig::from_json(r#"{"logging": {"level": "loud"}}"#).unwrap();
        assert_eq!(config.logging.app_name, "vidcall");
        assert!(matches!(config.install_logging(), Err(SessionError::Infra(_))));
    }

    #[test]
    fn test_missing_file_is_a_config_error() {
        assert!(matches!(
            SessionConfig::from_file("/nonexistent/vidcall.json"),
            Err(SessionError::Config { .. })
        ));
    }
}
