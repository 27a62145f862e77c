//! Delta compression of raw statistics
//!
//! Every entry keeps its identity (`id`, `type`, `timestamp`); all other
//! values are only emitted when they differ from the previous sample.

use std::collections::HashMap;

use serde_json::{Map, Value};
use vidcall_peer_core::{RtcStatistic, RtcStatsReport};

/// Remembers the last sample of one peer connection
#[derive(Debug, Default)]
pub struct StatsCompressor {
    previous: HashMap<String, RtcStatistic>,
}

impl StatsCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Changes since the previous call, keyed by stat id
    pub fn compress(&mut self, report: &RtcStatsReport) -> Map<String, Value> {
        let mut output = Map::new();

        for (id, statistic) in &report.statistics {
            let previous = self.previous.get(id);
            let mut entry = Map::new();
            entry.insert("id".to_string(), Value::from(statistic.id.clone()));
            entry.insert("type".to_string(), Value::from(statistic.stat_type.clone()));
            entry.insert("timestamp".to_string(), Value::from(statistic.timestamp_us));

            for (key, value) in &statistic.values {
                let unchanged = previous
                    .and_then(|previous| previous.values.get(key))
                    .is_some_and(|old| old == value);
                if !unchanged {
                    entry.insert(key.clone(), value.clone());
                }
            }

            output.insert(id.clone(), Value::Object(entry));
        }

        self.previous = report.statistics.clone();
        output
    }

    /// Forget the previous sample so the next one is emitted in full
    pub fn reset(&mut self) {
        self.previous.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn report(timestamp: f64, bytes: u64, codec: &str) -> RtcStatsReport {
        RtcStatsReport::new(
            timestamp,
            [RtcStatistic::new("OT01V1", "outbound-rtp", timestamp)
                .with_value("bytesSent", bytes)
                .with_value("codecId", codec)],
        )
    }

    #[test]
    fn test_first_sample_is_emitted_in_full() {
        let mut compressor = StatsCompressor::new();
        let output = compressor.compress(&report(1.0, 100, "COT01"));

        assert_eq!(
            Value::Object(output),
            json!({
                "OT01V1": {
                    "id": "OT01V1",
                    "type": "outbound-rtp",
                    "timestamp": 1.0,
                    "bytesSent": 100,
                    "codecId": "COT01"
                }
            })
        );
    }

    #[test]
    fn test_unchanged_values_are_dropped() {
        let mut compressor = StatsCompressor::new();
        compressor.compress(&report(1.0, 100, "COT01"));
        let output = compressor.compress(&report(2.0, 250, "COT01"));

        assert_eq!(
            Value::Object(output),
            json!({
                "OT01V1": {
                    "id": "OT01V1",
                    "type": "outbound-rtp",
                    "timestamp": 2.0,
                    "bytesSent": 250
                }
            })
        );
    }

    #[test]
    fn test_reset_emits_everything_again() {
        let mut compressor = StatsCompressor::new();
        compressor.compress(&report(1.0, 100, "COT01"));
        compressor.reset();
        let output = compressor.compress(&report(2.0, 100, "COT01"));

        assert!(output["OT01V1"].get("codecId").is_some());
    }
}
