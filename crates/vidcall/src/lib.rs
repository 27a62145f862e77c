//! # vidcall - WebRTC call sessions against a selective forwarding unit
//!
//! vidcall establishes and maintains the WebRTC session of a video call:
//! signaling with the SFU, the publisher and subscriber peer connections,
//! ICE trickling, local media, audio session reconciliation and
//! statistics reporting.
//!
//! ## Crates
//!
//! - [`infra_common`]: logging, retry policies, task bags
//! - [`signal_core`]: SFU adapter, authentication, wire models
//! - [`peer_core`]: peer connection coordinators, ICE and media adapters
//! - [`audio_core`]: audio store with its reducers and middleware
//! - [`call_core`]: call stage state machine
//! - [`stats_core`]: statistics pipeline
//!
//! ## Quick start
//!
//! ```no_run
//! use vidcall::prelude::*;
//!
//! # async fn run(api: std::sync::Arc<dyn CallApi>,
//! #     transports: std::sync::Arc<dyn vidcall::signal_core::SignalTransportFactory>,
//! #     services: std::sync::Arc<dyn vidcall::signal_core::SignalServiceFactory>,
//! #     peers: std::sync::Arc<dyn vidcall::peer_core::PeerConnectionFactory>,
//! #     capture: std::sync::Arc<dyn vidcall::peer_core::CaptureProvider>) -> SessionResult<()> {
//! let config = SessionConfig::from_file("vidcall.json")?;
//! config.install_logging()?;
//! let session = CallSession::builder("default:standup")
//!     .config(config)
//!     .call_api(api)
//!     .transport_factory(transports)
//!     .service_factory(services)
//!     .peer_connection_factory(peers)
//!     .capture_provider(capture)
//!     .build()?;
//!
//! session.join(session.join_input()).await?;
//! session.leave("user hung up").await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod session;

pub use vidcall_audio_core as audio_core;
pub use vidcall_call_core as call_core;
pub use vidcall_infra_common as infra_common;
pub use vidcall_peer_core as peer_core;
pub use vidcall_signal_core as signal_core;
pub use vidcall_stats_core as stats_core;

pub use api::CallApi;
pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use session::{CallSession, CallSessionBuilder};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::api::CallApi;
    pub use crate::config::SessionConfig;
    pub use crate::error::{SessionError, SessionResult};
    pub use crate::session::{CallSession, CallSessionBuilder};
    pub use vidcall_call_core::{CallStage, JoinInput, StageId};
    pub use vidcall_signal_core::{CallSettings, JoinCallResponse, TrackType};
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
