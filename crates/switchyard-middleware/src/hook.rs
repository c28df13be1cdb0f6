//! Route hook traits.
//!
//! A compiled route runs hooks at fixed points of its lifecycle, described by
//! [`HookKind`]. Request hooks ([`Hook`]) can inspect and modify the request,
//! write to the reply, or fail; once any stage sends the reply, the remaining
//! request hooks and the handler are skipped. Error hooks ([`ErrorHook`]) run
//! when a request hook or the handler fails and may send their own response.
//!
//! # Example
//!
//! ```
//! use switchyard_core::{ErrorCode, RouteError};
//! use switchyard_middleware::{FnHook, RouteHook};
//!
//! let require_tenant = RouteHook::request(FnHook::new(|request, _reply| {
//!     match request.header("x-tenant") {
//!         Some(_) => Ok(()),
//!         None => Err(RouteError::http(ErrorCode::S004)),
//!     }
//! }));
//! assert!(require_tenant.as_request().is_some());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::ready;
use std::sync::Arc;
use switchyard_core::request::{Reply, RouteRequest};
use switchyard_core::{BoxFuture, RouteError};

/// Lifecycle points a hook can attach to, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookKind {
    /// First thing after the request is matched.
    OnRequest,
    /// Before schema validation. Input transforms run here.
    PreValidation,
    /// After validation, right before the handler.
    PreHandler,
    /// After a payload is sent, before it is serialized. Output transforms
    /// run here.
    PreSerialization,
    /// When a hook or the handler fails.
    OnError,
}

impl HookKind {
    /// The camelCase name of the hook point.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OnRequest => "onRequest",
            Self::PreValidation => "preValidation",
            Self::PreHandler => "preHandler",
            Self::PreSerialization => "preSerialization",
            Self::OnError => "onError",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request lifecycle hook.
pub trait Hook: Send + Sync {
    /// Runs the hook.
    fn call<'a>(
        &'a self,
        request: &'a mut RouteRequest,
        reply: &'a Reply,
    ) -> BoxFuture<'a, Result<(), RouteError>>;
}

/// An error hook.
pub trait ErrorHook: Send + Sync {
    /// Runs the hook for `error`.
    fn call<'a>(
        &'a self,
        error: &'a RouteError,
        request: &'a RouteRequest,
        reply: &'a Reply,
    ) -> BoxFuture<'a, Result<(), RouteError>>;
}

/// Adapts a synchronous closure into a [`Hook`].
pub struct FnHook<F>(F);

impl<F> FnHook<F>
where
    F: Fn(&mut RouteRequest, &Reply) -> Result<(), RouteError> + Send + Sync,
{
    /// Wraps `f`.
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Hook for FnHook<F>
where
    F: Fn(&mut RouteRequest, &Reply) -> Result<(), RouteError> + Send + Sync,
{
    fn call<'a>(
        &'a self,
        request: &'a mut RouteRequest,
        reply: &'a Reply,
    ) -> BoxFuture<'a, Result<(), RouteError>> {
        Box::pin(ready((self.0)(request, reply)))
    }
}

/// Adapts a synchronous closure into an [`ErrorHook`].
pub struct FnErrorHook<F>(F);

impl<F> FnErrorHook<F>
where
    F: Fn(&RouteError, &RouteRequest, &Reply) -> Result<(), RouteError> + Send + Sync,
{
    /// Wraps `f`.
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ErrorHook for FnErrorHook<F>
where
    F: Fn(&RouteError, &RouteRequest, &Reply) -> Result<(), RouteError> + Send + Sync,
{
    fn call<'a>(
        &'a self,
        error: &'a RouteError,
        request: &'a RouteRequest,
        reply: &'a Reply,
    ) -> BoxFuture<'a, Result<(), RouteError>> {
        Box::pin(ready((self.0)(error, request, reply)))
    }
}

/// A resolved hook, ready to attach to a route.
#[derive(Clone)]
pub enum RouteHook {
    /// Request lifecycle hook.
    Request(Arc<dyn Hook>),
    /// Error hook.
    Error(Arc<dyn ErrorHook>),
}

impl RouteHook {
    /// Wraps a request hook.
    pub fn request(hook: impl Hook + 'static) -> Self {
        Self::Request(Arc::new(hook))
    }

    /// Wraps an error hook.
    pub fn error(hook: impl ErrorHook + 'static) -> Self {
        Self::Error(Arc::new(hook))
    }

    /// The request hook, if this is one.
    #[must_use]
    pub fn as_request(&self) -> Option<&Arc<dyn Hook>> {
        match self {
            Self::Request(hook) => Some(hook),
            Self::Error(_) => None,
        }
    }

    /// The error hook, if this is one.
    #[must_use]
    pub fn as_error(&self) -> Option<&Arc<dyn ErrorHook>> {
        match self {
            Self::Error(hook) => Some(hook),
            Self::Request(_) => None,
        }
    }

    /// Whether two handles point at the same hook.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Request(a), Self::Request(b)) => Arc::ptr_eq(a, b),
            (Self::Error(a), Self::Error(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for RouteHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(_) => f.write_str("RouteHook::Request"),
            Self::Error(_) => f.write_str("RouteHook::Error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use serde_json::json;
    use switchyard_core::ErrorCode;

    fn request() -> RouteRequest {
        RouteRequest::new("r", Method::GET, "/".parse().unwrap())
    }

    #[tokio::test]
    async fn test_fn_hook_mutates_request() {
        let hook = FnHook::new(|request: &mut RouteRequest, _reply: &Reply| {
            request.query.insert("seen".into(), json!(true));
            Ok(())
        });
        let mut request = request();
        hook.call(&mut request, &Reply::new()).await.unwrap();
        assert_eq!(request.query.get("seen"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_fn_error_hook_can_send() {
        let hook = FnErrorHook::new(|error: &RouteError, _request: &RouteRequest, reply: &Reply| {
            reply.set_status(error.status_code());
            reply.send(json!({ "handled": true }));
            Ok(())
        });
        let reply = Reply::new();
        let error = RouteError::http(ErrorCode::S005);
        hook.call(&error, &request(), &reply).await.unwrap();
        assert!(reply.is_sent());
        assert_eq!(reply.status(), http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_hook_kind_names() {
        assert_eq!(HookKind::PreHandler.as_str(), "preHandler");
        assert_eq!(
            serde_json::to_value(HookKind::PreSerialization).unwrap(),
            json!("preSerialization")
        );
    }
}
