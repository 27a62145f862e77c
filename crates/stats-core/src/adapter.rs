//! Collector and reporter wired together for one call session

use std::sync::{Arc, Weak};

use tokio::sync::watch;
use tracing::debug;
use vidcall_infra_common::DisposableBag;
use vidcall_signal_core::SfuAdapter;

use crate::collector::{CallStatsReport, StatsCollector, StatsSource};
use crate::config::StatsConfig;
use crate::error::{StatsError, StatsResult};
use crate::reporter::StatsReporter;

/// Samples the peer connections and reports the samples upstream
pub struct StatsAdapter {
    config: StatsConfig,
    collector: StatsCollector,
    reporter: Arc<StatsReporter>,
    bag: DisposableBag,
}

impl StatsAdapter {
    /// Create an adapter reading from `source`; nothing runs until [`start`](Self::start)
    pub fn new(source: &Arc<dyn StatsSource>, config: StatsConfig) -> Self {
        let collector = StatsCollector::new(source);
        let reporter = Arc::new(StatsReporter::new(config.clone()));
        let bag = DisposableBag::new("stats-adapter");

        let mut reports = collector.subscribe();
        let weak_reporter = Arc::downgrade(&reporter);
        bag.spawn_keyed("forward", async move {
            while reports.changed().await.is_ok() {
                let Some(reporter) = weak_reporter.upgrade() else {
                    break;
                };
                let report = reports.borrow_and_update().clone();
                if let Some(report) = report {
                    reporter.update(report);
                }
            }
        });

        Self {
            config,
            collector,
            reporter,
            bag,
        }
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// Start sampling and periodic delivery
    pub fn start(&self) {
        self.collector.start(self.config.collection_interval);
        self.reporter.start();
    }

    /// Stop sampling and delivery; the latest sample is kept
    pub fn stop(&self) {
        self.collector.stop();
        self.reporter.stop();
        self.bag.remove("publisher-change");
    }

    pub fn set_sfu_adapter(&self, sfu_adapter: Option<Arc<SfuAdapter>>) {
        self.reporter.set_sfu_adapter(sfu_adapter);
    }

    pub fn set_session(&self, session_id: impl Into<String>, unified_session_id: impl Into<String>) {
        self.reporter.set_session(session_id, unified_session_id);
    }

    pub fn set_error_handler(&self, handler: impl Fn(&StatsError) + Send + Sync + 'static) {
        self.reporter.set_error_handler(handler);
    }

    pub fn latest(&self) -> Option<CallStatsReport> {
        self.collector.latest()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<CallStatsReport>> {
        self.collector.subscribe()
    }

    pub fn reporter(&self) -> &Arc<StatsReporter> {
        &self.reporter
    }

    /// Sample immediately and deliver the result
    pub async fn collect_and_deliver(&self) -> StatsResult<bool> {
        let report = self.collector.collect().await.ok_or(StatsError::NoReport)?;
        self.reporter.update(report);
        self.reporter.deliver().await
    }

    pub fn trigger_delivery(&self) -> bool {
        self.reporter.trigger_delivery()
    }

    /// Deliver a fresh sample once the new publisher had time to produce statistics
    pub fn publisher_did_change(&self) {
        let delay = self.config.publisher_change_delay;
        let reporter: Weak<StatsReporter> = Arc::downgrade(&self.reporter);
        debug!(delay_ms = delay.as_millis() as u64, "Publisher changed; scheduling statistics delivery");
        self.bag.spawn_keyed("publisher-change", async move {
            tokio::time::sleep(delay).await;
            if let Some(reporter) = reporter.upgrade() {
                reporter.trigger_delivery();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StaticStatsSource, sample_report};
    use std::time::Duration;
    use vidcall_signal_core::testing::{MockSignalService, MockSignalTransport};
    use vidcall_signal_core::{ClientDetails, SfuAdapterConfig};

    fn adapter(config: StatsConfig) -> (Arc<StaticStatsSource>, Arc<MockSignalService>, StatsAdapter) {
        let source = Arc::new(StaticStatsSource::from_report(&sample_report(1_000_000.0, 100)));
        let dyn_source: Arc<dyn StatsSource> = source.clone();
        let service = Arc::new(MockSignalService::new());
        let adapter = StatsAdapter::new(&dyn_source, config);
        adapter.set_sfu_adapter(Some(Arc::new(SfuAdapter::new(
            Arc::new(MockSignalTransport::new("sfu")),
            service.clone(),
            SfuAdapterConfig::default(),
            ClientDetails::default(),
        ))));
        adapter.set_session("session-1", "unified-1");
        (source, service, adapter)
    }

    #[tokio::test]
    async fn test_collect_and_deliver() {
        let (_source, service, adapter) = adapter(StatsConfig::default());

        assert_eq!(adapter.collect_and_deliver().await, Ok(true));
        assert_eq!(service.stats_reports().len(), 1);
        assert!(adapter.latest().is_some());
    }

    #[tokio::test]
    async fn test_samples_flow_into_periodic_delivery() {
        let (_source, service, adapter) = adapter(StatsConfig {
            collection_interval: Duration::from_millis(10),
            delivery_interval: Duration::from_millis(25),
            ..StatsConfig::default()
        });

        adapter.start();
        tokio::time::sleep(Duration::from_millis(80)).await;
        adapter.stop();

        let sent = service.stats_reports();
        assert!(!sent.is_empty());
        assert_eq!(sent[0].encode_stats.len(), 1);
    }

    #[tokio::test]
    async fn test_publisher_change_triggers_a_delayed_delivery() {
        let (_source, service, adapter) = adapter(StatsConfig {
            publisher_change_delay: Duration::from_millis(20),
            ..StatsConfig::default()
        });
        adapter.reporter().update(sample_report(1_000_000.0, 100));

        adapter.publisher_did_change();
        adapter.publisher_did_change();
        assert!(service.stats_reports().is_empty());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(service.stats_reports().len(), 1);
    }
}
