//! Logging and metrics plumbing for Switchyard.
//!
//! - [`logging`]: [`LogConfig`] and [`init_logging`], a `tracing-subscriber`
//!   registry with an `EnvFilter` and JSON or pretty output
//! - [`metrics`]: request counters and latency histograms recorded through
//!   the `metrics` facade
//!
//! The router emits one `info` event per completed request under the
//! `switchyard::http` target ([`logging::fields::REQUEST_LOG_TARGET`]), so a
//! filter such as `warn,switchyard::http=info` keeps only the access log.

#![doc(html_root_url = "https://docs.rs/switchyard-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig, LogFormat};
pub use self::metrics::{describe_metrics, record_generation, record_request, RequestKind};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
