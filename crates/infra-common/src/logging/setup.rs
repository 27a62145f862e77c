use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt};

use crate::errors::{InfraError, InfraResult};

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// The log level to use, e.g. "info" or "debug"
    pub level: String,
    /// Whether to enable JSON formatting
    pub json: bool,
    /// Whether to include file and line information
    pub file_info: bool,
    /// Whether to log spans
    pub log_spans: bool,
    /// Application name to include in logs
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
            file_info: false,
            log_spans: false,
            app_name: "vidcall".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level: level.as_str().to_lowercase(),
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Enable JSON formatting
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Enable file and line information in logs
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Enable span logging
    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }
}

/// Set up the logging system with the provided configuration.
///
/// Fails when the level is unknown or a global subscriber is already
/// installed.
pub fn setup_logging(config: LoggingConfig) -> InfraResult<()> {
    let level = parse_log_level(&config.level)?;
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let mut subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events);

    if config.file_info {
        subscriber = subscriber.with_file(true).with_line_number(true);
    }

    let installed = if config.json {
        subscriber.with_writer(std::io::stdout).json().try_init()
    } else {
        subscriber.try_init()
    };

    installed.map_err(|e| InfraError::logging(e.to_string()))?;
    log_welcome(&config.app_name, env!("CARGO_PKG_VERSION"));
    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> InfraResult<Level> {
    Level::from_str(level).map_err(|_| InfraError::config(format!("Invalid log level: {}", level)))
}

/// Log a welcome message with version info
pub fn log_welcome(app_name: &str, version: &str) {
    tracing::info!("Starting {} v{}", app_name, version);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(matches!(
            parse_log_level("chatty"),
            Err(InfraError::Config { .. })
        ));
    }

    #[test]
    fn test_builder_flags() {
        let config = LoggingConfig::new(Level::DEBUG, "test-app")
            .with_json()
            .with_file_info()
            .with_spans();
        assert_eq!(config.level, "debug");
        assert!(config.json);
        assert!(config.file_info);
        assert!(config.log_spans);
        assert_eq!(config.app_name, "test-app");
    }

    #[test]
    #[serial]
    fn test_second_install_is_an_error() {
        // The first call may already fail if another test installed a subscriber.
        let _ = setup_logging(LoggingConfig::default());
        let second = setup_logging(LoggingConfig::default());
        assert!(matches!(second, Err(InfraError::Logging { .. })));
    }

    #[test]
    #[serial]
    fn test_invalid_level_fails_before_install() {
        let config = LoggingConfig {
            level: "loud".into(),
            ..Default::default()
        };
        assert!(matches!(setup_logging(config), Err(InfraError::Config { .. })));
    }
}
