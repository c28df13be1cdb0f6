//! Controller and route declarations.
//!
//! These are the inputs to [`Router::register`](crate::Router::register).
//! A host framework (or a test) builds a list of [`ControllerDescriptor`]s:
//! route groups sharing a base path, and middleware.
//!
//! Handlers receive their arguments positionally, in the order given by the
//! route's [`Binding`] list, so the same handler shape works for
//! `(body)`, `(params, query)` or `(request, reply)`.

use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use switchyard_core::route::{HttpMethod, RenderTarget, RouteMetadata};
use switchyard_core::schema::Schema;
use switchyard_core::{BoxFuture, ErrorCode, Reply, RouteError, RouteRequest};
use switchyard_middleware::MiddlewareDescriptor;

/// A request part bound to a handler argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// A copy of the whole request.
    Request,
    /// The reply handle.
    Reply,
    /// The parsed body.
    Body,
    /// The query object.
    Query,
    /// The path parameter object.
    Params,
}

/// One resolved handler argument.
#[derive(Debug, Clone)]
pub enum HandlerArg {
    /// Bound with [`Binding::Request`].
    Request(Box<RouteRequest>),
    /// Bound with [`Binding::Reply`].
    Reply(Reply),
    /// Bound with [`Binding::Body`], [`Binding::Query`] or [`Binding::Params`].
    Value(Value),
}

/// Positional handler arguments.
#[derive(Debug, Clone, Default)]
pub struct HandlerArgs {
    args: Vec<HandlerArg>,
}

impl HandlerArgs {
    /// Wraps resolved arguments.
    #[must_use]
    pub fn new(args: Vec<HandlerArg>) -> Self {
        Self { args }
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Whether there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// The argument at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&HandlerArg> {
        self.args.get(index)
    }

    /// The JSON value at `index`.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&Value> {
        match self.args.get(index) {
            Some(HandlerArg::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Deserializes the value at `index`.
    ///
    /// Fails with `S006` when the argument is missing or does not fit `T`.
    pub fn json<T: DeserializeOwned>(&self, index: usize) -> Result<T, RouteError> {
        let value = self.value(index).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| {
            RouteError::http_with_message(
                ErrorCode::S006,
                format!("argument {index} is malformed: {e}"),
            )
        })
    }

    /// The request at `index`.
    #[must_use]
    pub fn request(&self, index: usize) -> Option<&RouteRequest> {
        match self.args.get(index) {
            Some(HandlerArg::Request(request)) => Some(request.as_ref()),
            _ => None,
        }
    }

    /// The reply at `index`.
    #[must_use]
    pub fn reply(&self, index: usize) -> Option<&Reply> {
        match self.args.get(index) {
            Some(HandlerArg::Reply(reply)) => Some(reply),
            _ => None,
        }
    }
}

/// A business handler.
pub trait RouteHandler: Send + Sync {
    /// Runs the handler. The returned value is what gets sent.
    fn call(&self, args: HandlerArgs) -> BoxFuture<'static, Result<Value, RouteError>>;
}

struct FnHandler<F, Fut, T> {
    f: F,
    _marker: PhantomData<fn() -> (Fut, T)>,
}

impl<F, Fut, T> RouteHandler for FnHandler<F, Fut, T>
where
    F: Fn(HandlerArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, RouteError>> + Send + 'static,
    T: Serialize,
{
    fn call(&self, args: HandlerArgs) -> BoxFuture<'static, Result<Value, RouteError>> {
        let future = (self.f)(args);
        Box::pin(async move {
            let output = future.await?;
            serde_json::to_value(output)
                .map_err(|e| RouteError::internal_with_source("cannot serialize handler output", e))
        })
    }
}

/// Adapts an async closure into a [`RouteHandler`].
///
/// ```
/// use serde_json::json;
/// use switchyard_router::{handler_fn, HandlerArgs};
///
/// let handler = handler_fn(|args: HandlerArgs| async move {
///     let id: String = args.json(0)?;
///     Ok(json!({ "id": id }))
/// });
/// ```
pub fn handler_fn<F, Fut, T>(f: F) -> Arc<dyn RouteHandler>
where
    F: Fn(HandlerArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, RouteError>> + Send + 'static,
    T: Serialize + 'static,
{
    Arc::new(FnHandler {
        f,
        _marker: PhantomData,
    })
}

/// Where a declared header value comes from.
#[derive(Clone)]
pub enum HeaderSource {
    /// A fixed value.
    Static(String),
    /// Evaluated on every request.
    Computed(Arc<dyn Fn() -> String + Send + Sync>),
}

impl fmt::Debug for HeaderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed"),
        }
    }
}

/// A declared route.
#[derive(Clone)]
pub struct RouteDescriptor {
    pub(crate) metadata: RouteMetadata,
    pub(crate) headers: Vec<(String, HeaderSource)>,
    pub(crate) bindings: Vec<Binding>,
    pub(crate) handler: Arc<dyn RouteHandler>,
}

impl fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("metadata", &self.metadata)
            .field("headers", &self.headers)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

impl RouteDescriptor {
    /// Declares a route from externally produced metadata.
    ///
    /// Missing method or path is reported at registration.
    pub fn from_metadata(metadata: RouteMetadata, handler: Arc<dyn RouteHandler>) -> Self {
        Self {
            metadata,
            headers: Vec::new(),
            bindings: Vec::new(),
            handler,
        }
    }

    /// Declares a route.
    pub fn new(method: HttpMethod, path: impl Into<String>, handler: Arc<dyn RouteHandler>) -> Self {
        Self::from_metadata(RouteMetadata::new(method, path), handler)
    }

    /// Declares a GET route.
    pub fn get(path: impl Into<String>, handler: Arc<dyn RouteHandler>) -> Self {
        Self::new(HttpMethod::Get, path, handler)
    }

    /// Declares a POST route.
    pub fn post(path: impl Into<String>, handler: Arc<dyn RouteHandler>) -> Self {
        Self::new(HttpMethod::Post, path, handler)
    }

    /// Declares a PUT route.
    pub fn put(path: impl Into<String>, handler: Arc<dyn RouteHandler>) -> Self {
        Self::new(HttpMethod::Put, path, handler)
    }

    /// Declares a PATCH route.
    pub fn patch(path: impl Into<String>, handler: Arc<dyn RouteHandler>) -> Self {
        Self::new(HttpMethod::Patch, path, handler)
    }

    /// Declares a DELETE route.
    pub fn delete(path: impl Into<String>, handler: Arc<dyn RouteHandler>) -> Self {
        Self::new(HttpMethod::Delete, path, handler)
    }

    /// Declares a route for every method.
    pub fn all(path: impl Into<String>, handler: Arc<dyn RouteHandler>) -> Self {
        Self::new(HttpMethod::All, path, handler)
    }

    /// The route metadata.
    #[must_use]
    pub fn metadata(&self) -> &RouteMetadata {
        &self.metadata
    }

    /// Overrides the response status.
    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.metadata.status = Some(status.as_u16());
        self
    }

    /// Adds a fixed response header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .push((name.into(), HeaderSource::Static(value.into())));
        self
    }

    /// Adds a response header evaluated per request.
    #[must_use]
    pub fn computed_header<F>(mut self, name: impl Into<String>, value: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.headers
            .push((name.into(), HeaderSource::Computed(Arc::new(value))));
        self
    }

    /// Appends a handler argument binding.
    #[must_use]
    pub fn bind(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Sets the API version used for `/v{n}` prefixing.
    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.metadata.version = Some(version);
        self
    }

    /// Keeps the raw request bytes.
    #[must_use]
    pub fn raw_body(mut self) -> Self {
        self.metadata.raw_body = true;
        self
    }

    /// Attaches validation failures to the request instead of failing it.
    #[must_use]
    pub fn silent_validation(mut self) -> Self {
        self.metadata.silent_validation = true;
        self
    }

    /// Redirects to `target` after the handler runs.
    #[must_use]
    pub fn redirect(mut self, target: impl Into<String>) -> Self {
        self.metadata.redirect = Some(target.into());
        self
    }

    /// Renders the named template with the handler output.
    #[must_use]
    pub fn render(mut self, template: impl Into<String>) -> Self {
        self.metadata.render = Some(RenderTarget::Template(template.into()));
        self
    }

    /// Renders the `{template, data}` pair returned by the handler.
    #[must_use]
    pub fn render_dynamic(mut self) -> Self {
        self.metadata.render = Some(RenderTarget::Dynamic);
        self
    }

    /// Declares the body schema.
    #[must_use]
    pub fn body_schema(mut self, schema: impl Into<Arc<Schema>>) -> Self {
        self.metadata.schemas.body = Some(schema.into());
        self
    }

    /// Declares the path parameter schema.
    #[must_use]
    pub fn params_schema(mut self, schema: impl Into<Arc<Schema>>) -> Self {
        self.metadata.schemas.params = Some(schema.into());
        self
    }

    /// Declares the query schema.
    #[must_use]
    pub fn query_schema(mut self, schema: impl Into<Arc<Schema>>) -> Self {
        self.metadata.schemas.query = Some(schema.into());
        self
    }

    /// Declares a response schema for a status (`"200"`) or class (`"4xx"`).
    #[must_use]
    pub fn response_schema(mut self, status: impl Into<String>, schema: impl Into<Arc<Schema>>) -> Self {
        self.metadata
            .schemas
            .response
            .insert(status.into(), schema.into());
        self
    }

    /// Attaches free-form metadata, visible to middleware generators.
    #[must_use]
    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.extra.insert(key.into(), value);
        self
    }
}

/// A group of routes sharing a base path.
#[derive(Debug, Clone, Default)]
pub struct RouterController {
    pub(crate) base_path: Option<String>,
    pub(crate) routes: Vec<RouteDescriptor>,
}

impl RouterController {
    /// A group under `base_path`.
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: Some(base_path.into()),
            routes: Vec::new(),
        }
    }

    /// A group without a base path.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Adds a route.
    #[must_use]
    pub fn route(mut self, route: RouteDescriptor) -> Self {
        self.routes.push(route);
        self
    }
}

/// One declared controller.
#[derive(Debug, Clone)]
pub enum ControllerDescriptor {
    /// A route group.
    Router(RouterController),
    /// A middleware.
    Middleware(MiddlewareDescriptor),
}

impl From<RouterController> for ControllerDescriptor {
    fn from(controller: RouterController) -> Self {
        Self::Router(controller)
    }
}

impl From<MiddlewareDescriptor> for ControllerDescriptor {
    fn from(middleware: MiddlewareDescriptor) -> Self {
        Self::Middleware(middleware)
    }
}
