//! Typed configuration for Switchyard.
//!
//! - [`RouterConfig`]: route prefixing, log masking, child routes, error detail
//! - [`SwitchyardConfig`]: the router section plus [`LogConfig`]
//! - [`ConfigLoader`]: defaults → TOML/JSON files → `PREFIX__KEY` environment
//!   variables → validation
//!
//! Unknown keys are rejected at every level.
//!
//! ```no_run
//! use switchyard_config::ConfigLoader;
//!
//! # fn main() -> Result<(), switchyard_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("switchyard.toml")?
//!     .with_env_prefix("SWITCHYARD")
//!     .load()?;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/switchyard-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;

pub use config::{RouterConfig, SwitchyardConfig};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use switchyard_telemetry::{LogConfig, LogFormat};
