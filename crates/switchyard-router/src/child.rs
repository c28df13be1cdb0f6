//! In-process child routes.
//!
//! A child route is a GET route executed from inside another request,
//! without a transport. The child runs the same [`CompiledRoute`] the
//! transport runs, in a child context of the caller's, and its response is
//! captured into a [`ChildRouteResult`] instead of being written anywhere.
//!
//! Child requests carry `x-service: internal-child-route`, so their request
//! log records name them as internal traffic.
//!
//! ```no_run
//! # use switchyard_router::ChildDispatcher;
//! # async fn compose(children: &ChildDispatcher) -> Result<(), switchyard_core::RouteError> {
//! let item = children.resolve("/items/42?fields=name").await?;
//! assert_eq!(item.status_code, 200);
//! # Ok(())
//! # }
//! ```

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use switchyard_core::request::SERVICE_HEADER;
use switchyard_core::{ChildRouteResult, Context, ErrorCode, Reply, RouteError, RouteRequest};

use crate::chain::{CompiledRoute, DispatchMode};
use crate::error_handler::ErrorHandler;
use crate::path::{PathError, PathIndex};
use crate::transport::parse_query;

/// `x-service` value set on every child request. It is applied after all
/// other child headers, so it cannot be overridden.
pub const CHILD_ROUTE_SERVICE: &str = "internal-child-route";

/// Computes extra headers for child requests from the caller's context.
pub type ChildRouteHeaders = Arc<dyn Fn(&Context) -> HeaderMap + Send + Sync>;

/// Dispatches child routes. Cheap to clone.
#[derive(Clone)]
pub struct ChildDispatcher {
    enabled: bool,
    routes: Arc<RwLock<PathIndex<Arc<CompiledRoute>>>>,
    headers: Option<ChildRouteHeaders>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl fmt::Debug for ChildDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildDispatcher")
            .field("enabled", &self.enabled)
            .field("routes", &self.routes.read().len())
            .finish_non_exhaustive()
    }
}

impl ChildDispatcher {
    pub(crate) fn new(
        enabled: bool,
        headers: Option<ChildRouteHeaders>,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Self {
        Self {
            enabled,
            routes: Arc::new(RwLock::new(PathIndex::new())),
            headers,
            error_handler,
        }
    }

    /// Whether child routes are enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of routes reachable as children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    /// Whether no route is reachable as a child.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    pub(crate) fn insert(&self, path: &str, route: Arc<CompiledRoute>) -> Result<(), PathError> {
        self.routes.write().insert(path, route)
    }

    /// Runs the GET route matching `url` (`/path?query`) as a child of the
    /// active request.
    ///
    /// Handler and validation failures come back as an error response in
    /// the result. Disabled child routes, context misuse (no active request,
    /// or already inside a child) and configuration errors are returned as
    /// `Err`, as is an unknown path (`S002`).
    pub async fn resolve(&self, url: &str) -> Result<ChildRouteResult, RouteError> {
        self.resolve_with_headers(url, HeaderMap::new()).await
    }

    /// Like [`resolve`](Self::resolve), with extra request headers.
    ///
    /// Headers are layered as the configured child headers, then `headers`,
    /// then the `x-service` marker.
    pub async fn resolve_with_headers(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<ChildRouteResult, RouteError> {
        if !self.enabled {
            return Err(RouteError::configuration("child routes are not enabled"));
        }

        let uri: Uri = url.parse().map_err(|_| {
            RouteError::http_with_message(ErrorCode::S006, format!("invalid child route '{url}'"))
        })?;

        let found = self
            .routes
            .read()
            .find(uri.path())
            .map(|found| found.map(|(route, params)| (Arc::clone(route), params)))
            .map_err(|e| RouteError::http_with_message(ErrorCode::S006, e.to_string()))?;
        let Some((route, params)) = found else {
            tracing::debug!(url, "child route not found");
            return Err(RouteError::http(ErrorCode::S002));
        };

        let context = Context::new();
        let mut merged = self
            .headers
            .as_ref()
            .map(|compute| compute(&context))
            .unwrap_or_default();
        merge_headers(&mut merged, headers);
        merged.insert(
            HeaderName::from_static(SERVICE_HEADER),
            HeaderValue::from_static(CHILD_ROUTE_SERVICE),
        );

        let reply = Reply::new();
        let mut request = RouteRequest::new(String::new(), Method::GET, uri);
        request.headers = merged;
        request.params = params;
        request.query = parse_query(request.uri.query());

        let store = context.begin_child(request.head(), reply.clone())?;
        request.id = store.rid().to_string();
        tracing::debug!(rid = %request.id, path = route.path(), "dispatching child route");

        let run = route.run(&mut request, &reply, DispatchMode::Child, &*self.error_handler);
        Context::scope(store, run).await?;
        Ok(reply.child_result())
    }
}

/// Overlays `extra` on `base`; every value of a name in `extra` replaces
/// the values `base` had for it.
fn merge_headers(base: &mut HeaderMap, extra: HeaderMap) {
    let mut current = None;
    for (name, value) in extra {
        if let Some(name) = name {
            base.remove(&name);
            current = Some(name);
        }
        if let Some(name) = &current {
            base.append(name.clone(), value);
        }
    }
}
