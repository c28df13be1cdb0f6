//! # Switchyard
//!
//! **Request-dispatch core for HTTP routers**
//!
//! Switchyard sits between declarative route metadata and an HTTP engine.
//! It compiles each route into a fixed execution chain once, at
//! registration, and runs that chain for every request:
//!
//! - **Request context** – a task-scoped key/value store, with isolated
//!   child scopes for in-process sub-requests
//! - **Compiled middleware** – ordered by weight, generated per route and
//!   cached by route metadata
//! - **Schema transforms** – per-field input/output coercion and log masking
//!   derived from schema annotations
//! - **Child routes** – any GET route can be run from inside another request
//!   without going through the network
//!
//! ## Quick Start
//!
//! ```no_run
//! use switchyard::prelude::*;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().with_env_prefix("SWITCHYARD").load()?;
//! let router = switchyard::bootstrap(&config, RouterOptions::default())?;
//!
//! let items = RouterController::new("/items").route(
//!     RouteDescriptor::get("/:id", handler_fn(|args| async move {
//!         let params = args.value(0).cloned();
//!         Ok(json!({ "params": params }))
//!     }))
//!     .bind(Binding::Params),
//! );
//!
//! let transport = MemoryTransport::new();
//! router.register(vec![items.into()], &transport).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Request pipeline
//!
//! ```text
//! onRequest → preValidation → validation → preHandler → handler
//!                                                          ↓
//!        request log ← preSerialization ← redirect / render / send
//! ```

#![doc(html_root_url = "https://docs.rs/switchyard/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error;

// Re-export core types
pub use switchyard_core as core;

// Re-export transform compiler
pub use switchyard_transform as transform;

// Re-export middleware types
pub use switchyard_middleware as middleware;

// Re-export router types
pub use switchyard_router as router;

// Re-export configuration
pub use switchyard_config as config;

// Re-export telemetry setup
pub use switchyard_telemetry as telemetry;

use switchyard_config::{ConfigError, SwitchyardConfig};
use switchyard_router::{Router, RouterOptions};
use switchyard_telemetry::TelemetryError;

/// Errors raised while starting up.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Logging could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

/// Validates `config`, installs the log subscriber it describes and builds
/// a router.
///
/// # Errors
///
/// Fails on invalid configuration, or when logging is enabled and a global
/// subscriber is already installed.
pub fn bootstrap(config: &SwitchyardConfig, options: RouterOptions) -> Result<Router, BootstrapError> {
    config.validate()?;
    switchyard_telemetry::init_logging(&config.logging)?;
    switchyard_telemetry::describe_metrics();
    tracing::info!(
        environment = %config.router.environment,
        child_routes = config.router.enable_child_routes,
        mask_sensitive_data = config.router.mask_sensitive_data,
        "switchyard router ready"
    );
    Ok(Router::with_options(config.router.clone(), options))
}

/// Prelude module for convenient imports.
///
/// ```
/// use switchyard::prelude::*;
/// ```
pub mod prelude {
    pub use switchyard_core::schema::{Pattern, Schema, SensitiveKind, TransformSpec};
    pub use switchyard_core::{
        BoxFuture, ChildRouteResult, Context, ContextError, ErrorCode, FieldError, HttpMethod,
        Reply, RequestLog, RouteError, RouteMetadata, RouteRequest, DISABLE_REQUEST_LOGGING,
    };

    pub use switchyard_middleware::{
        FnErrorHook, FnHook, HookKind, MiddlewareDescriptor, MiddlewareGenerator, RouteHook,
    };

    pub use switchyard_router::{
        handler_fn, Binding, ChildDispatcher, ControllerDescriptor, HandlerArgs, MemoryTransport,
        MockRequest, MockResponse, Renderer, RouteDescriptor, Router, RouterController,
        RouterError, RouterOptions, Transport, CHILD_ROUTE_SERVICE,
    };

    pub use switchyard_config::{ConfigLoader, RouterConfig, SwitchyardConfig};

    pub use crate::{bootstrap, BootstrapError};
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_config::RouterConfig;

    #[test]
    fn test_bootstrap_rejects_invalid_config() {
        let mut config = SwitchyardConfig::production();
        config.logging.enabled = false;
        config.router = RouterConfig::default().with_route_prefix("api/");

        let err = bootstrap(&config, RouterOptions::default()).unwrap_err();
        assert!(matches!(err, BootstrapError::Config(_)));
    }

    #[test]
    fn test_bootstrap_builds_router() {
        let mut config = SwitchyardConfig::development();
        config.logging.enabled = false;

        let router = bootstrap(&config, RouterOptions::default()).unwrap();
        assert!(router.config().debug_errors);
        assert!(!router.child_dispatcher().is_enabled());
    }
}
