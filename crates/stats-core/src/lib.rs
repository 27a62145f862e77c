//! Statistics pipeline for vidcall
//!
//! Native statistics of the publisher and subscriber connections are
//! sampled by a [`StatsCollector`], delta-compressed by a
//! [`StatsCompressor`], reduced to encoder and decoder performance by the
//! transformers and sent to the SFU by a [`StatsReporter`]. The pipeline
//! only reads from the peer connections and never affects the call.

pub mod adapter;
pub mod collector;
pub mod compressor;
pub mod config;
pub mod error;
pub mod reporter;
pub mod transformers;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adapter::StatsAdapter;
pub use collector::{CallStatsReport, StatsCollector, StatsSource};
pub use compressor::StatsCompressor;
pub use config::StatsConfig;
pub use error::{StatsError, StatsResult};
pub use reporter::{StatsErrorHandler, StatsReporter};
pub use transformers::{DecoderStatsTransformer, EncoderStatsTransformer};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::adapter::StatsAdapter;
    pub use crate::collector::{CallStatsReport, StatsSource};
    pub use crate::config::StatsConfig;
    pub use crate::error::{StatsError, StatsResult};
}
