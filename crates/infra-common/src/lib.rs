//! Common infrastructure shared by the vidcall crates
//!
//! This crate carries the cross-cutting pieces every layer of the WebRTC
//! session stack needs:
//!
//! - **Logging**: `tracing-subscriber` setup with env-filter and JSON output
//! - **Retry**: bounded-attempt retry with randomized backoff and an optional
//!   precondition check
//! - **Timeouts**: a race between an operation and a sleeping timer
//! - **Tasks**: a cancellation bag that owns the observation tasks of a component

pub mod errors;
pub mod logging;
pub mod retry;
pub mod tasks;

pub use errors::{InfraError, InfraResult};
pub use logging::{LoggingConfig, log_welcome, parse_log_level, setup_logging};
pub use retry::{RetryPolicy, retry_while, retry_with_policy, with_timeout};
pub use tasks::DisposableBag;

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::errors::{InfraError, InfraResult};
    pub use crate::logging::{LoggingConfig, setup_logging};
    pub use crate::retry::{RetryPolicy, retry_while, retry_with_policy, with_timeout};
    pub use crate::tasks::DisposableBag;
}
