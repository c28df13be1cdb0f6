//! # Switchyard Middleware
//!
//! Hooks, middleware declarations and the generated-middleware cache.
//!
//! Middleware is declared with a [`MiddlewareDescriptor`] that names a hook
//! point ([`HookKind`]), an ordering weight and either a fixed [`RouteHook`]
//! or a [`MiddlewareGenerator`]. At route registration the
//! [`MiddlewareCache`] resolves each descriptor for each route, invoking a
//! generator at most once per distinct key.

#![doc(html_root_url = "https://docs.rs/switchyard-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod descriptor;
pub mod hook;

pub use cache::{canonical_key, CacheError, MiddlewareCache};
pub use descriptor::{sort_by_weight, MiddlewareDescriptor, MiddlewareGenerator, MiddlewareSource};
pub use hook::{ErrorHook, FnErrorHook, FnHook, Hook, HookKind, RouteHook};
