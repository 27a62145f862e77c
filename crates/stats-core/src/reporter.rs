//! Delivery of collected statistics to the SFU
//!
//! At most one delivery is in flight at any time; a timer or a manual
//! trigger arriving while one runs is dropped rather than queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use vidcall_infra_common::DisposableBag;
use vidcall_peer_core::RtcStatsReport;
use vidcall_signal_core::{SendStatsRequest, SfuAdapter};

use crate::collector::CallStatsReport;
use crate::compressor::StatsCompressor;
use crate::config::StatsConfig;
use crate::error::{StatsError, StatsResult};
use crate::transformers::{DecoderStatsTransformer, EncoderStatsTransformer};

/// Invoked with every failed delivery
pub type StatsErrorHandler = Arc<dyn Fn(&StatsError) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct SessionIds {
    session_id: String,
    unified_session_id: String,
}

#[derive(Default)]
struct Pipeline {
    publisher: StatsCompressor,
    subscriber: StatsCompressor,
    encoder: EncoderStatsTransformer,
    decoder: DecoderStatsTransformer,
}

impl Pipeline {
    fn reset(&mut self) {
        self.publisher.reset();
        self.subscriber.reset();
        self.encoder.reset();
        self.decoder.reset();
    }
}

struct ReporterInner {
    sdk_version: String,
    sfu_adapter: RwLock<Option<Arc<SfuAdapter>>>,
    session: RwLock<Option<SessionIds>>,
    latest: Mutex<Option<CallStatsReport>>,
    pipeline: Mutex<Pipeline>,
    delivering: AtomicBool,
    delivered: AtomicU64,
    on_error: RwLock<Option<StatsErrorHandler>>,
}

/// Clears the in-flight flag when a delivery ends, however it ends
struct DeliveryGuard<'a>(&'a AtomicBool);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ReporterInner {
    async fn deliver(&self) -> StatsResult<bool> {
        if self
            .delivering
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Statistics delivery already in flight");
            return Ok(false);
        }
        let _guard = DeliveryGuard(&self.delivering);

        let result = self.send_latest().await;
        match &result {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                warn!(error = %e, "Statistics delivery failed");
                // the next delivery carries the full sample again
                self.pipeline.lock().reset();
                let handler = self.on_error.read().clone();
                if let Some(handler) = handler {
                    handler(e);
                }
            }
        }
        result.map(|()| true)
    }

    async fn send_latest(&self) -> StatsResult<()> {
        let sfu_adapter = self
            .sfu_adapter
            .read()
            .clone()
            .ok_or_else(|| StatsError::not_configured("no SFU adapter"))?;
        let session = self
            .session
            .read()
            .clone()
            .ok_or_else(|| StatsError::not_configured("no session"))?;
        let report = self.latest.lock().clone().ok_or(StatsError::NoReport)?;

        let request = {
            let mut pipeline = self.pipeline.lock();
            SendStatsRequest {
                session_id: session.session_id,
                unified_session_id: session.unified_session_id,
                publisher_stats: encode_side("publisher statistics", &mut pipeline.publisher, &report.publisher_raw_stats)?,
                subscriber_stats: encode_side(
                    "subscriber statistics",
                    &mut pipeline.subscriber,
                    &report.subscriber_raw_stats,
                )?,
                rtc_stats: "[]".to_string(),
                encode_stats: pipeline.encoder.transform(&report),
                decode_stats: pipeline.decoder.transform(&report),
                sdk_version: self.sdk_version.clone(),
            }
        };

        debug!(
            session_id = %request.session_id,
            encode_stats = request.encode_stats.len(),
            decode_stats = request.decode_stats.len(),
            "Delivering statistics"
        );
        sfu_adapter.send_stats(request).await?;
        Ok(())
    }
}

fn encode_side(what: &str, compressor: &mut StatsCompressor, raw: &Option<RtcStatsReport>) -> StatsResult<String> {
    let compressed = match raw {
        Some(raw) => compressor.compress(raw),
        None => Map::new(),
    };
    serde_json::to_string(&Value::Object(compressed)).map_err(|e| StatsError::encoding(what, &e))
}

/// Sends the latest [`CallStatsReport`] through [`SfuAdapter::send_stats`]
pub struct StatsReporter {
    config: StatsConfig,
    inner: Arc<ReporterInner>,
    bag: DisposableBag,
}

impl StatsReporter {
    pub fn new(config: StatsConfig) -> Self {
        let inner = Arc::new(ReporterInner {
            sdk_version: config.sdk_version.clone(),
            sfu_adapter: RwLock::new(None),
            session: RwLock::new(None),
            latest: Mutex::new(None),
            pipeline: Mutex::new(Pipeline::default()),
            delivering: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            on_error: RwLock::new(None),
        });
        Self {
            config,
            inner,
            bag: DisposableBag::new("stats-reporter"),
        }
    }

    pub fn set_sfu_adapter(&self, sfu_adapter: Option<Arc<SfuAdapter>>) {
        *self.inner.sfu_adapter.write() = sfu_adapter;
    }

    /// Session the reports are attributed to; a new session starts from a full sample
    pub fn set_session(&self, session_id: impl Into<String>, unified_session_id: impl Into<String>) {
        let ids = SessionIds {
            session_id: session_id.into(),
            unified_session_id: unified_session_id.into(),
        };
        let mut session = self.inner.session.write();
        if session.as_ref() != Some(&ids) {
            self.inner.pipeline.lock().reset();
            *session = Some(ids);
        }
    }

    pub fn set_error_handler(&self, handler: impl Fn(&StatsError) + Send + Sync + 'static) {
        *self.inner.on_error.write() = Some(Arc::new(handler));
    }

    /// Replace the report the next delivery sends
    pub fn update(&self, report: CallStatsReport) {
        *self.inner.latest.lock() = Some(report);
    }

    pub fn is_delivering(&self) -> bool {
        self.inner.delivering.load(Ordering::SeqCst)
    }

    /// Successful deliveries so far
    pub fn delivered_count(&self) -> u64 {
        self.inner.delivered.load(Ordering::SeqCst)
    }

    /// Deliver now; `Ok(false)` when another delivery is in flight
    pub async fn deliver(&self) -> StatsResult<bool> {
        self.inner.deliver().await
    }

    /// Start a delivery in the background unless one is already running
    pub fn trigger_delivery(&self) -> bool {
        if self.is_delivering() {
            debug!("Skipping triggered statistics delivery; one is in flight");
            return false;
        }
        let inner = self.inner.clone();
        self.bag.spawn(async move {
            let _ = inner.deliver().await;
        });
        true
    }

    /// Deliver at the configured interval until stopped
    pub fn start(&self) {
        let interval = self.config.delivery_interval;
        if interval.is_zero() {
            warn!("Statistics delivery interval is zero; periodic delivery disabled");
            return;
        }

        info!(interval_ms = interval.as_millis() as u64, "Starting statistics delivery");
        let inner = self.inner.clone();
        self.bag.spawn_keyed("deliver", async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let _ = inner.deliver().await;
            }
        });
    }

    pub fn stop(&self) {
        self.bag.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_report;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use vidcall_signal_core::testing::{MockSignalService, MockSignalTransport};
    use vidcall_signal_core::{ClientDetails, SfuAdapterConfig, SignalError};

    fn sfu(service: &Arc<MockSignalService>) -> Arc<SfuAdapter> {
        Arc::new(SfuAdapter::new(
            Arc::new(MockSignalTransport::new("sfu")),
            service.clone(),
            SfuAdapterConfig::default(),
            ClientDetails::default(),
        ))
    }

    fn configured(service: &Arc<MockSignalService>, config: StatsConfig) -> StatsReporter {
        let reporter = StatsReporter::new(config);
        reporter.set_sfu_adapter(Some(sfu(service)));
        reporter.set_session("session-1", "unified-1");
        reporter.update(sample_report(1_000_000.0, 100));
        reporter
    }

    #[tokio::test]
    async fn test_delivery_sends_compressed_and_transformed_stats() {
        let service = Arc::new(MockSignalService::new());
        let reporter = configured(&service, StatsConfig::default());

        assert_eq!(reporter.deliver().await, Ok(true));

        let sent = service.stats_reports();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].session_id, "session-1");
        assert_eq!(sent[0].unified_session_id, "unified-1");
        assert_eq!(sent[0].encode_stats.len(), 1);
        assert!(sent[0].publisher_stats.contains("framesEncoded"));
        assert_eq!(sent[0].subscriber_stats, "{}");
        assert_eq!(reporter.delivered_count(), 1);
    }

    #[tokio::test]
    async fn test_second_delivery_only_sends_changes() {
        let service = Arc::new(MockSignalService::new());
        let reporter = configured(&service, StatsConfig::default());

        reporter.deliver().await.unwrap();
        reporter.deliver().await.unwrap();

        let sent = service.stats_reports();
        assert!(!sent[1].publisher_stats.contains("framesEncoded"));
        assert!(sent[1].publisher_stats.contains("outbound-rtp"));
    }

    #[tokio::test]
    async fn test_failure_reaches_the_error_handler() {
        let service = Arc::new(MockSignalService::new());
        let reporter = configured(&service, StatsConfig::default());
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = errors.clone();
        reporter.set_error_handler(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        service.fail_next(SignalError::not_connected("send_stats"));
        assert!(reporter.deliver().await.is_err());
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(!reporter.is_delivering());

        // the failed sample is sent in full again
        reporter.deliver().await.unwrap();
        assert!(service.stats_reports()[1].publisher_stats.contains("framesEncoded"));
    }

    #[tokio::test]
    async fn test_unconfigured_reporter_fails() {
        let reporter = StatsReporter::new(StatsConfig::default());
        reporter.update(sample_report(1_000_000.0, 100));

        assert!(matches!(
            reporter.deliver().await,
            Err(StatsError::NotConfigured { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_report_fails() {
        let service = Arc::new(MockSignalService::new());
        let reporter = StatsReporter::new(StatsConfig::default());
        reporter.set_sfu_adapter(Some(sfu(&service)));
        reporter.set_session("session-1", "unified-1");

        assert_eq!(reporter.deliver().await, Err(StatsError::NoReport));
    }

    #[tokio::test]
    async fn test_trigger_is_dropped_while_delivering() {
        let service = Arc::new(MockSignalService::new());
        let reporter = configured(&service, StatsConfig::default());

        reporter.inner.delivering.store(true, Ordering::SeqCst);
        assert!(!reporter.trigger_delivery());
        assert_eq!(reporter.deliver().await, Ok(false));

        reporter.inner.delivering.store(false, Ordering::SeqCst);
        assert!(reporter.trigger_delivery());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(service.stats_reports().len(), 1);
    }

    #[tokio::test]
    async fn test_periodic_delivery() {
        let service = Arc::new(MockSignalService::new());
        let reporter = configured(
            &service,
            StatsConfig {
                delivery_interval: Duration::from_millis(10),
                ..StatsConfig::default()
            },
        );

        reporter.start();
        tokio::time::sleep(Duration::from_millis(55)).await;
        reporter.stop();

        assert!(service.stats_reports().len() >= 2);
    }
}
