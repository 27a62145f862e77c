//! Periodic sampling of native statistics
//!
//! The collector reads both peer connections at the collection interval
//! and publishes the combined sample through a watch channel. It never
//! owns the connections: once the source is gone sampling stops.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};
use vidcall_infra_common::DisposableBag;
use vidcall_peer_core::{PeerConnectionsAdapter, PeerResult, RtcStatsReport};
use vidcall_signal_core::{PeerConnectionType, TrackType};

const TRACK_TYPES: [TrackType; 3] = [TrackType::Audio, TrackType::Video, TrackType::ScreenShare];

/// One sample of both peer connections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallStatsReport {
    pub publisher_raw_stats: Option<RtcStatsReport>,
    pub subscriber_raw_stats: Option<RtcStatsReport>,
    /// Track id to the kind of media it carries, local and remote
    pub track_to_kind_map: HashMap<String, TrackType>,
    pub timestamp: DateTime<Utc>,
}

/// Where statistics are read from
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Native statistics of one side, `None` while that side does not exist
    async fn statistics(&self, peer_type: PeerConnectionType) -> Option<PeerResult<RtcStatsReport>>;

    /// Track ids of every local and remote track keyed to their type
    fn track_to_kind_map(&self) -> HashMap<String, TrackType>;
}

#[async_trait]
impl StatsSource for PeerConnectionsAdapter {
    async fn statistics(&self, peer_type: PeerConnectionType) -> Option<PeerResult<RtcStatsReport>> {
        let coordinator = match peer_type {
            PeerConnectionType::Publisher => self.publisher(),
            PeerConnectionType::Subscriber => self.subscriber(),
        }?;
        Some(coordinator.statistics().await)
    }

    fn track_to_kind_map(&self) -> HashMap<String, TrackType> {
        let mut map = HashMap::new();
        if let Some(publisher) = self.publisher() {
            for track_type in TRACK_TYPES {
                if let Some(track) = publisher.local_track(track_type) {
                    map.insert(track.track_id().to_string(), track_type);
                }
            }
        }
        if let Some(subscriber) = self.subscriber() {
            for track_type in TRACK_TYPES {
                for track_id in subscriber.media_adapter().remote_track_ids(track_type) {
                    map.insert(track_id, track_type);
                }
            }
        }
        map
    }
}

/// Samples a [`StatsSource`] at a fixed interval
pub struct StatsCollector {
    source: Weak<dyn StatsSource>,
    report_tx: watch::Sender<Option<CallStatsReport>>,
    bag: DisposableBag,
}

impl StatsCollector {
    pub fn new(source: &Arc<dyn StatsSource>) -> Self {
        Self {
            source: Arc::downgrade(source),
            report_tx: watch::channel(None).0,
            bag: DisposableBag::new("stats-collector"),
        }
    }

    /// Latest sample, if any
    pub fn latest(&self) -> Option<CallStatsReport> {
        self.report_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<CallStatsReport>> {
        self.report_tx.subscribe()
    }

    /// Sample once and publish the result
    pub async fn collect(&self) -> Option<CallStatsReport> {
        let report = sample(&self.source).await?;
        self.report_tx.send_replace(Some(report.clone()));
        Some(report)
    }

    /// Start sampling every `interval`, replacing a running schedule
    pub fn start(&self, interval: Duration) {
        if interval.is_zero() {
            warn!("Statistics collection interval is zero; sampling disabled");
            self.bag.remove("collect");
            return;
        }

        let source = self.source.clone();
        let report_tx = self.report_tx.clone();
        self.bag.spawn_keyed("collect", async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if source.strong_count() == 0 {
                    debug!("Statistics source released; stopping collection");
                    break;
                }
                if let Some(report) = sample(&source).await {
                    report_tx.send_replace(Some(report));
                }
            }
        });
    }

    pub fn stop(&self) {
        self.bag.cancel_all();
    }

    pub fn is_running(&self) -> bool {
        self.bag.contains("collect")
    }
}

async fn sample(source: &Weak<dyn StatsSource>) -> Option<CallStatsReport> {
    let source = source.upgrade()?;
    let publisher_raw_stats = read_side(source.as_ref(), PeerConnectionType::Publisher).await;
    let subscriber_raw_stats = read_side(source.as_ref(), PeerConnectionType::Subscriber).await;

    Some(CallStatsReport {
        publisher_raw_stats,
        subscriber_raw_stats,
        track_to_kind_map: source.track_to_kind_map(),
        timestamp: Utc::now(),
    })
}

async fn read_side(source: &dyn StatsSource, peer_type: PeerConnectionType) -> Option<RtcStatsReport> {
    match source.statistics(peer_type).await? {
        Ok(report) => Some(report),
        Err(e) => {
            warn!(peer_type = %peer_type, error = %e, "Failed to read peer connection statistics");
            None
        }
    }
}
