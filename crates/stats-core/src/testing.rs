//! Scripted statistics sources

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use vidcall_peer_core::{PeerError, PeerResult, RtcStatistic, RtcStatsReport};
use vidcall_signal_core::{PeerConnectionType, TrackType};

use crate::collector::{CallStatsReport, StatsSource};

/// A publisher sample with one VP8 camera track
pub fn sample_report(timestamp_us: f64, frames_encoded: u64) -> CallStatsReport {
    CallStatsReport {
        publisher_raw_stats: Some(RtcStatsReport::new(
            timestamp_us,
            [
                RtcStatistic::new("COT01_96", "codec", timestamp_us)
                    .with_value("mimeType", "video/VP8")
                    .with_value("clockRate", 90_000)
                    .with_value("payloadType", 96),
                RtcStatistic::new("SV1", "media-source", timestamp_us).with_value("trackIdentifier", "camera"),
                RtcStatistic::new("OT01V1", "outbound-rtp", timestamp_us)
                    .with_value("kind", "video")
                    .with_value("codecId", "COT01_96")
                    .with_value("mediaSourceId", "SV1")
                    .with_value("framesEncoded", frames_encoded)
                    .with_value("totalEncodeTime", frames_encoded as f64 / 100.0)
                    .with_value("frameWidth", 640)
                    .with_value("frameHeight", 480),
            ],
        )),
        subscriber_raw_stats: None,
        track_to_kind_map: HashMap::from([("camera".to_string(), TrackType::Video)]),
        timestamp: Utc::now(),
    }
}

/// Source returning whatever it was last given
#[derive(Default)]
pub struct StaticStatsSource {
    publisher: Mutex<Option<PeerResult<RtcStatsReport>>>,
    subscriber: Mutex<Option<PeerResult<RtcStatsReport>>>,
    track_map: Mutex<HashMap<String, TrackType>>,
    reads: AtomicUsize,
}

impl StaticStatsSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source replaying the raw statistics of `report`
    pub fn from_report(report: &CallStatsReport) -> Self {
        let source = Self::new();
        *source.publisher.lock() = report.publisher_raw_stats.clone().map(Ok);
        *source.subscriber.lock() = report.subscriber_raw_stats.clone().map(Ok);
        *source.track_map.lock() = report.track_to_kind_map.clone();
        source
    }

    pub fn set_publisher(&self, report: RtcStatsReport) {
        *self.publisher.lock() = Some(Ok(report));
    }

    pub fn set_subscriber(&self, report: RtcStatsReport) {
        *self.subscriber.lock() = Some(Ok(report));
    }

    pub fn fail_subscriber(&self, error: PeerError) {
        *self.subscriber.lock() = Some(Err(error));
    }

    pub fn map_track(&self, track_id: impl Into<String>, track_type: TrackType) {
        self.track_map.lock().insert(track_id.into(), track_type);
    }

    /// Number of `statistics` calls so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatsSource for StaticStatsSource {
    async fn statistics(&self, peer_type: PeerConnectionType) -> Option<PeerResult<RtcStatsReport>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match peer_type {
            PeerConnectionType::Publisher => self.publisher.lock().clone(),
            PeerConnectionType::Subscriber => self.subscriber.lock().clone(),
        }
    }

    fn track_to_kind_map(&self) -> HashMap<String, TrackType> {
        self.track_map.lock().clone()
    }
}
