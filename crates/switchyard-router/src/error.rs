//! Registration errors.
//!
//! Everything here is raised while routes are compiled. None of it is
//! recoverable at request time, so the router surfaces these at startup.

use crate::path::PathError;
use switchyard_config::ConfigError;
use switchyard_middleware::{CacheError, HookKind};
use switchyard_transform::TransformError;
use thiserror::Error;

/// Errors raised while compiling and registering routes.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A route declared no method.
    #[error("route '{path}' has no method")]
    MissingMethod {
        /// Declared sub-path.
        path: String,
    },

    /// A route declared no path.
    #[error("route {method} has no path")]
    MissingPath {
        /// Declared method.
        method: String,
    },

    /// The path template could not be indexed.
    #[error("cannot register {method} {path}: {source}")]
    Path {
        /// HTTP method.
        method: String,
        /// Full path template.
        path: String,
        /// Why indexing failed.
        #[source]
        source: PathError,
    },

    /// A schema referenced an unknown transformer.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// A middleware key could not be derived.
    #[error(transparent)]
    Middleware(#[from] CacheError),

    /// A render target was declared but no renderer is configured.
    #[error("route {method} {path} renders a template but no renderer is configured")]
    MissingRenderer {
        /// HTTP method.
        method: String,
        /// Full path.
        path: String,
    },

    /// A middleware produced a hook that does not fit its hook point.
    #[error("middleware '{middleware}' is declared for {kind} but produced a {produced} hook")]
    HookKindMismatch {
        /// Middleware name.
        middleware: String,
        /// Declared hook point.
        kind: HookKind,
        /// What was produced (`request` or `error`).
        produced: &'static str,
    },

    /// A declared header name or value is not valid HTTP.
    #[error("invalid header '{name}' on route {path}: {reason}")]
    InvalidHeader {
        /// Header name.
        name: String,
        /// Full path.
        path: String,
        /// Parser message.
        reason: String,
    },

    /// A declared status is not a valid HTTP status.
    #[error("invalid status {status} on route {path}")]
    InvalidStatus {
        /// Declared status.
        status: u16,
        /// Full path.
        path: String,
    },

    /// A redirect target is not a valid header value.
    #[error("invalid redirect target '{target}' on route {path}")]
    InvalidRedirect {
        /// Declared target.
        target: String,
        /// Full path.
        path: String,
    },

    /// The router configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RouterError::MissingMethod { path: "/users".into() };
        assert_eq!(err.to_string(), "route '/users' has no method");

        let err = RouterError::HookKindMismatch {
            middleware: "audit".into(),
            kind: HookKind::OnError,
            produced: "request",
        };
        assert_eq!(
            err.to_string(),
            "middleware 'audit' is declared for onError but produced a request hook"
        );
    }

    #[test]
    fn test_transform_error_is_transparent() {
        let err: RouterError = TransformError::UnknownTransformer { name: "x:y".into() }.into();
        assert_eq!(err.to_string(), "unknown transformer 'x:y'");
    }
}
