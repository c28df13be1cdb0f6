//! # Switchyard Core
//!
//! Shared building blocks for the Switchyard request-dispatch core.
//!
//! - [`context`]: request-scoped key/value store with child scopes
//! - [`error`]: [`RouteError`], [`ContextError`] and the public error codes
//! - [`schema`]: compiled schema model, validation and field annotations
//! - [`route`]: serializable route metadata
//! - [`request`]: [`RouteRequest`] and the shared [`Reply`] sink
//!
//! Everything else in the workspace (transforms, middleware, the router and
//! the child dispatcher) is built on top of these types.

#![doc(html_root_url = "https://docs.rs/switchyard-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod error;
pub mod request;
pub mod route;
pub mod schema;

use std::future::Future;
use std::pin::Pin;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use context::{Context, ContextStore, DISABLE_REQUEST_LOGGING};
pub use error::{ContextError, ErrorBody, ErrorCode, ErrorType, FieldError, RouteError, RouteResult};
pub use request::{ChildRouteResult, Reply, RequestHead, RequestLog, RouteRequest};
pub use route::{HttpMethod, RenderTarget, RouteMetadata, RouteSchemas};
pub use schema::{Schema, SchemaType, SensitiveKind};
