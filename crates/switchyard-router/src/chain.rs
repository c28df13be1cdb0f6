//! Compiled route pipeline.
//!
//! A [`CompiledRoute`] is what registration produces for one declared route
//! and what both the transport and the child dispatcher execute. A request
//! runs through it in a fixed order:
//!
//! 1. `onRequest` hooks
//! 2. `preValidation` hooks, input transforms first
//! 3. validation
//! 4. `preHandler` hooks
//! 5. status and declared headers, then the handler
//! 6. redirect, render or send
//! 7. `preSerialization` hooks, output transforms last
//! 8. the request log
//!
//! Any stage that sends the reply ends steps 1 to 6 early. A failure in steps
//! 1 to 6 runs the `onError` hooks and then the error handler; context misuse
//! and configuration errors skip both and are returned to the caller.
//!
//! The error handler is not part of the compiled route. External requests
//! use the one configured on the transport, child requests the one held by
//! the child dispatcher; [`Router::register`](crate::Router::register) hands
//! the router's handler to both.

use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard_core::route::{HttpMethod, RouteMetadata};
use switchyard_core::{
    BoxFuture, Context, ContextStore, Reply, RequestLog, RouteError, RouteRequest,
    DISABLE_REQUEST_LOGGING,
};
use switchyard_core::request::SERVICE_HEADER;
use switchyard_middleware::{ErrorHook, Hook, HookKind};
use switchyard_telemetry::logging::fields::REQUEST_LOG_TARGET;
use switchyard_telemetry::RequestKind;
use switchyard_transform::CompiledTransform;

use crate::descriptor::{Binding, HandlerArg, HandlerArgs, RouteHandler};
use crate::error_handler::ErrorHandler;
use crate::render::{dynamic_target, Renderer};
use crate::validation::RouteValidator;

/// How a request reached the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Through a transport.
    External,
    /// Through the child dispatcher.
    Child,
}

impl DispatchMode {
    const fn request_kind(self) -> RequestKind {
        match self {
            Self::External => RequestKind::External,
            Self::Child => RequestKind::Child,
        }
    }
}

/// A declared header, ready to write.
#[derive(Clone)]
pub(crate) enum CompiledHeader {
    Static(HeaderValue),
    Computed(Arc<dyn Fn() -> String + Send + Sync>),
}

impl CompiledHeader {
    fn value(&self, name: &HeaderName) -> Result<HeaderValue, RouteError> {
        match self {
            Self::Static(value) => Ok(value.clone()),
            Self::Computed(compute) => HeaderValue::from_str(&compute()).map_err(|e| {
                RouteError::internal_with_source(format!("computed header '{name}' is not a valid value"), e)
            }),
        }
    }
}

/// Hooks attached to a route, grouped by lifecycle point.
#[derive(Default, Clone)]
pub(crate) struct RouteHooks {
    pub(crate) on_request: Vec<Arc<dyn Hook>>,
    pub(crate) pre_validation: Vec<Arc<dyn Hook>>,
    pub(crate) pre_handler: Vec<Arc<dyn Hook>>,
    pub(crate) pre_serialization: Vec<Arc<dyn Hook>>,
    pub(crate) on_error: Vec<Arc<dyn ErrorHook>>,
}

impl RouteHooks {
    pub(crate) fn push(&mut self, kind: HookKind, hook: Arc<dyn Hook>) {
        match kind {
            HookKind::OnRequest => self.on_request.push(hook),
            HookKind::PreValidation => self.pre_validation.push(hook),
            HookKind::PreHandler => self.pre_handler.push(hook),
            HookKind::PreSerialization => self.pre_serialization.push(hook),
            // Request hooks never reach the error list; registration rejects them.
            HookKind::OnError => {}
        }
    }

    fn count(&self, kind: HookKind) -> usize {
        match kind {
            HookKind::OnRequest => self.on_request.len(),
            HookKind::PreValidation => self.pre_validation.len(),
            HookKind::PreHandler => self.pre_handler.len(),
            HookKind::PreSerialization => self.pre_serialization.len(),
            HookKind::OnError => self.on_error.len(),
        }
    }
}

/// Input transforms for the request parts, run as the first
/// `preValidation` hook.
pub(crate) struct InputTransforms {
    pub(crate) body: Option<Arc<CompiledTransform>>,
    pub(crate) query: Option<Arc<CompiledTransform>>,
    pub(crate) params: Option<Arc<CompiledTransform>>,
}

impl InputTransforms {
    pub(crate) fn is_empty(&self) -> bool {
        self.body.is_none() && self.query.is_none() && self.params.is_none()
    }
}

fn transform_map(
    transform: &CompiledTransform,
    map: &mut serde_json::Map<String, Value>,
    root: &str,
) -> Result<(), RouteError> {
    let mut value = Value::Object(std::mem::take(map));
    let result = transform.apply(&mut value, root);
    if let Value::Object(transformed) = value {
        *map = transformed;
    }
    result.map_err(RouteError::from)
}

impl Hook for InputTransforms {
    fn call<'a>(
        &'a self,
        request: &'a mut RouteRequest,
        _reply: &'a Reply,
    ) -> BoxFuture<'a, Result<(), RouteError>> {
        Box::pin(async move {
            if let Some(transform) = &self.params {
                transform_map(transform, &mut request.params, "params")?;
            }
            if let Some(transform) = &self.query {
                transform_map(transform, &mut request.query, "query")?;
            }
            if let Some(transform) = &self.body {
                transform.apply(&mut request.body, "body")?;
            }
            Ok(())
        })
    }
}

/// Output transforms keyed by status (`"200"`) or status class (`"2xx"`),
/// run as the last `preSerialization` hook.
pub(crate) struct ResponseTransforms {
    pub(crate) by_status: BTreeMap<String, Arc<CompiledTransform>>,
}

impl ResponseTransforms {
    fn select(&self, status: StatusCode) -> Option<&Arc<CompiledTransform>> {
        self.by_status
            .get(status.as_str())
            .or_else(|| self.by_status.get(&status_class(status)))
    }
}

impl Hook for ResponseTransforms {
    fn call<'a>(
        &'a self,
        _request: &'a mut RouteRequest,
        reply: &'a Reply,
    ) -> BoxFuture<'a, Result<(), RouteError>> {
        Box::pin(async move {
            let Some(transform) = self.select(reply.status()) else {
                return Ok(());
            };
            reply
                .update_body(|body| transform.apply(body, "response"))
                .unwrap_or(Ok(()))
                .map_err(RouteError::from)
        })
    }
}

/// `"4xx"` for 404.
pub(crate) fn status_class(status: StatusCode) -> String {
    format!("{}xx", status.as_u16() / 100)
}

/// Log masks for the request parts.
#[derive(Default, Clone)]
pub(crate) struct LogMasks {
    pub(crate) query: Option<Arc<CompiledTransform>>,
    pub(crate) body: Option<Arc<CompiledTransform>>,
}

/// One registered route, compiled.
pub struct CompiledRoute {
    pub(crate) method: HttpMethod,
    pub(crate) path: String,
    pub(crate) metadata: Arc<RouteMetadata>,
    pub(crate) status: StatusCode,
    pub(crate) headers: Vec<(HeaderName, CompiledHeader)>,
    pub(crate) bindings: Vec<Binding>,
    pub(crate) handler: Arc<dyn RouteHandler>,
    pub(crate) hooks: RouteHooks,
    pub(crate) validator: RouteValidator,
    pub(crate) masks: LogMasks,
    pub(crate) redirect: Option<(HeaderValue, StatusCode)>,
    pub(crate) render: Option<(RenderStep, Arc<dyn Renderer>)>,
}

/// What to render after the handler.
#[derive(Debug, Clone)]
pub(crate) enum RenderStep {
    Template(String),
    Dynamic,
}

impl fmt::Debug for CompiledRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRoute")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("status", &self.status)
            .field("bindings", &self.bindings)
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}

impl CompiledRoute {
    /// Declared method.
    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    /// Full path template, including prefix and version.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Resolved response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Route metadata, with the full path and merged response schemas.
    #[must_use]
    pub fn metadata(&self) -> &RouteMetadata {
        &self.metadata
    }

    /// Number of hooks attached at `kind`, transforms included.
    #[must_use]
    pub fn hook_count(&self, kind: HookKind) -> usize {
        self.hooks.count(kind)
    }

    /// Runs an external request in a fresh root context. Failures are
    /// answered by `error_handler`, the transport's handler.
    pub async fn dispatch(
        &self,
        mut request: RouteRequest,
        reply: Reply,
        error_handler: &dyn ErrorHandler,
    ) -> Result<(), RouteError> {
        let store = ContextStore::root(request.id.clone(), request.head(), reply.clone());
        Context::scope(store, async {
            self.run(&mut request, &reply, DispatchMode::External, error_handler)
                .await
        })
        .await
    }

    /// Runs the pipeline in the active context.
    ///
    /// Returns `Err` only for fatal errors; every other failure ends up in
    /// `reply` as an error response written by the `onError` hooks or by
    /// `error_handler`.
    pub async fn run(
        &self,
        request: &mut RouteRequest,
        reply: &Reply,
        mode: DispatchMode,
        error_handler: &dyn ErrorHandler,
    ) -> Result<(), RouteError> {
        let started = Instant::now();

        if let Err(error) = self.execute(request, reply, mode).await {
            if error.is_fatal() {
                tracing::error!(
                    rid = %request.id,
                    method = %request.method,
                    url = %request.url(),
                    error = %error,
                    "route pipeline aborted"
                );
                return Err(error);
            }
            self.recover(&error, request, reply, error_handler).await?;
        }

        if let Err(error) = self.serialize(request, reply).await {
            if error.is_fatal() {
                return Err(error);
            }
            tracing::warn!(rid = %request.id, error = %error, "preSerialization hook failed");
        }

        log_request(request, reply, mode, started.elapsed(), &self.masks)
    }

    async fn execute(
        &self,
        request: &mut RouteRequest,
        reply: &Reply,
        mode: DispatchMode,
    ) -> Result<(), RouteError> {
        if run_hooks(&self.hooks.on_request, request, reply).await?
            || run_hooks(&self.hooks.pre_validation, request, reply).await?
        {
            return Ok(());
        }

        self.validator
            .validate(request, mode == DispatchMode::External)?;

        if run_hooks(&self.hooks.pre_handler, request, reply).await? {
            return Ok(());
        }

        reply.set_status(self.status);
        for (name, header) in &self.headers {
            reply.insert_header(name.clone(), header.value(name)?);
        }

        let output = self.handler.call(self.bind(request, reply)).await?;
        self.respond(output, reply).await
    }

    fn bind(&self, request: &RouteRequest, reply: &Reply) -> HandlerArgs {
        let args = self
            .bindings
            .iter()
            .map(|binding| match binding {
                Binding::Request => HandlerArg::Request(Box::new(request.clone())),
                Binding::Reply => HandlerArg::Reply(reply.clone()),
                Binding::Body => HandlerArg::Value(request.body.clone()),
                Binding::Query => HandlerArg::Value(Value::Object(request.query.clone())),
                Binding::Params => HandlerArg::Value(Value::Object(request.params.clone())),
            })
            .collect();
        HandlerArgs::new(args)
    }

    async fn respond(&self, output: Value, reply: &Reply) -> Result<(), RouteError> {
        if let Some((location, status)) = &self.redirect {
            reply.redirect(location.clone(), *status);
            return Ok(());
        }

        if let Some((step, renderer)) = &self.render {
            return match step {
                RenderStep::Template(template) => renderer.render(template, output, reply).await,
                RenderStep::Dynamic => {
                    let (template, data) = dynamic_target(output)?;
                    renderer.render(&template, data, reply).await
                }
            };
        }

        if !reply.is_sent() && !is_empty_output(&output) {
            reply.send(output);
        }
        Ok(())
    }

    async fn recover(
        &self,
        error: &RouteError,
        request: &RouteRequest,
        reply: &Reply,
        error_handler: &dyn ErrorHandler,
    ) -> Result<(), RouteError> {
        for hook in &self.hooks.on_error {
            if reply.is_sent() {
                break;
            }
            if let Err(hook_error) = hook.call(error, request, reply).await {
                if hook_error.is_fatal() {
                    return Err(hook_error);
                }
                tracing::warn!(rid = %request.id, error = %hook_error, "onError hook failed");
            }
        }

        if !reply.is_sent() {
            error_handler.handle(error, request, reply);
        }
        Ok(())
    }

    async fn serialize(&self, request: &mut RouteRequest, reply: &Reply) -> Result<(), RouteError> {
        if !reply.has_body() {
            return Ok(());
        }
        for hook in &self.hooks.pre_serialization {
            hook.call(request, reply).await?;
        }
        Ok(())
    }
}

/// Records metrics and writes the request log record.
///
/// Also used by transports for requests rejected before reaching a
/// pipeline. Skipped when the active context sets
/// [`DISABLE_REQUEST_LOGGING`].
pub(crate) fn log_request(
    request: &RouteRequest,
    reply: &Reply,
    mode: DispatchMode,
    elapsed: Duration,
    masks: &LogMasks,
) -> Result<(), RouteError> {
    let status = reply.status().as_u16();
    switchyard_telemetry::record_request(request.method.as_str(), status, mode.request_kind(), elapsed);

    if Context::is_active()
        && Context::new()
            .resolve::<bool>(DISABLE_REQUEST_LOGGING)?
            .unwrap_or(false)
    {
        return Ok(());
    }

    let mask = |value: Value, transform: Option<&Arc<CompiledTransform>>| match transform {
        Some(transform) => transform.masked(&value),
        None => value,
    };
    let query = (!request.query.is_empty())
        .then(|| mask(Value::Object(request.query.clone()), masks.query.as_ref()));
    let body = (!request.body.is_null()).then(|| mask(request.body.clone(), masks.body.as_ref()));

    let log = RequestLog {
        rid: request.id.clone(),
        method: request.method.to_string(),
        url: request.url(),
        status,
        service: request.header(SERVICE_HEADER).map(ToString::to_string),
        time_taken: format!("{:.3}", elapsed.as_secs_f64() * 1000.0),
        query,
        body,
    };

    tracing::info!(
        target: REQUEST_LOG_TARGET,
        rid = %log.rid,
        method = %log.method,
        url = %log.url,
        status = log.status,
        time_taken_ms = %log.time_taken,
        service = log.service.as_deref(),
        query = ?log.query,
        body = ?log.body,
        child = (mode == DispatchMode::Child),
        "request completed"
    );
    reply.set_request_log(log);
    Ok(())
}

/// Runs `hooks` in order. Returns `true` once the reply has been sent.
async fn run_hooks(
    hooks: &[Arc<dyn Hook>],
    request: &mut RouteRequest,
    reply: &Reply,
) -> Result<bool, RouteError> {
    for hook in hooks {
        if reply.is_sent() {
            return Ok(true);
        }
        hook.call(request, reply).await?;
    }
    Ok(reply.is_sent())
}

fn is_empty_output(output: &Value) -> bool {
    match output {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use serde_json::json;
    use switchyard_core::schema::{Schema, TransformSpec};
    use switchyard_transform::{TransformCompiler, TransformKind};

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(StatusCode::NOT_FOUND), "4xx");
        assert_eq!(status_class(StatusCode::CREATED), "2xx");
    }

    #[test]
    fn test_empty_output() {
        assert!(is_empty_output(&Value::Null));
        assert!(is_empty_output(&json!("")));
        assert!(!is_empty_output(&json!(0)));
        assert!(!is_empty_output(&json!({})));
    }

    fn trimmed_name() -> Arc<Schema> {
        Arc::new(Schema::object().property(
            "name",
            Schema::string().transform(TransformSpec::Both("string:trim".into())),
        ))
    }

    #[tokio::test]
    async fn test_response_transform_selects_exact_then_class() {
        let compiler = TransformCompiler::default();
        let output = compiler.compile(&trimmed_name(), TransformKind::Output).unwrap();
        let hook = ResponseTransforms {
            by_status: BTreeMap::from([("2xx".to_string(), output)]),
        };

        let mut request = RouteRequest::new("rid", Method::GET, "/".parse().unwrap());
        let reply = Reply::new();
        reply.set_status(StatusCode::CREATED);
        reply.send(json!({ "name": "  ada  " }));
        hook.call(&mut request, &reply).await.unwrap();
        assert_eq!(reply.body(), Some(json!({ "name": "ada" })));

        let reply = Reply::new();
        reply.set_status(StatusCode::NOT_FOUND);
        reply.send(json!({ "name": "  ada  " }));
        hook.call(&mut request, &reply).await.unwrap();
        assert_eq!(reply.body(), Some(json!({ "name": "  ada  " })));
    }

    #[tokio::test]
    async fn test_input_transforms_touch_each_part() {
        let compiler = TransformCompiler::default();
        let input = compiler.compile(&trimmed_name(), TransformKind::Input).unwrap();
        let hook = InputTransforms {
            body: Some(Arc::clone(&input)),
            query: Some(Arc::clone(&input)),
            params: None,
        };

        let mut request = RouteRequest::new("rid", Method::POST, "/".parse().unwrap());
        request.body = json!({ "name": " body " });
        request.query.insert("name".into(), json!(" query "));
        request.params.insert("name".into(), json!(" params "));
        hook.call(&mut request, &Reply::new()).await.unwrap();

        assert_eq!(request.body, json!({ "name": "body" }));
        assert_eq!(request.query.get("name"), Some(&json!("query")));
        assert_eq!(request.params.get("name"), Some(&json!(" params ")));
    }
}
