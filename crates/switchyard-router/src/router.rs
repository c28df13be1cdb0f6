//! Route compilation and registration.

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use switchyard_config::RouterConfig;
use switchyard_core::route::{HttpMethod, RenderTarget, RouteMetadata};
use switchyard_core::schema::Schema;
use switchyard_core::Context;
use switchyard_middleware::{sort_by_weight, HookKind, MiddlewareCache, MiddlewareDescriptor, RouteHook};
use switchyard_transform::{CompiledTransform, TransformCompiler, TransformKind, TransformerRegistry};

use crate::chain::{
    CompiledHeader, CompiledRoute, InputTransforms, LogMasks, RenderStep, ResponseTransforms, RouteHooks,
};
use crate::child::{ChildDispatcher, ChildRouteHeaders};
use crate::descriptor::{ControllerDescriptor, HeaderSource, RouteDescriptor};
use crate::error::RouterError;
use crate::error_handler::{DefaultErrorHandler, ErrorHandler};
use crate::render::Renderer;
use crate::transport::{JsonBodyParser, RawBodyParser, RouteRegistration, Transport};
use crate::validation::RouteValidator;

/// Schema id of the default `4xx`/`5xx` response schema.
pub const ERROR_BODY_SCHEMA_ID: &str = "switchyard:error-body";

/// The response schemas every route gets unless it declares its own:
/// the error body for `4xx` and `5xx`.
pub fn default_response_schemas() -> BTreeMap<String, Arc<Schema>> {
    let error_body = Arc::new(error_body_schema());
    BTreeMap::from([
        ("4xx".to_string(), Arc::clone(&error_body)),
        ("5xx".to_string(), error_body),
    ])
}

/// Router settings that cannot live in a config file.
#[derive(Clone)]
pub struct RouterOptions {
    /// Transformers merged over the built-ins.
    pub transformers: TransformerRegistry,
    /// Extra headers for child requests.
    pub child_route_headers: Option<ChildRouteHeaders>,
    /// Template renderer for routes with a render target.
    pub renderer: Option<Arc<dyn Renderer>>,
    /// Error handler for failed requests, external and child. Defaults to
    /// [`DefaultErrorHandler`] honouring `debug_errors`. Registration
    /// installs it on the transport.
    pub error_handler: Option<Arc<dyn ErrorHandler>>,
    /// Response schemas merged into every route, keyed by status or status
    /// class. A route's own schema for the same key wins.
    pub response_schemas: BTreeMap<String, Arc<Schema>>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            transformers: TransformerRegistry::empty(),
            child_route_headers: None,
            renderer: None,
            error_handler: None,
            response_schemas: default_response_schemas(),
        }
    }
}

impl fmt::Debug for RouterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterOptions")
            .field("transformers", &self.transformers)
            .field("child_route_headers", &self.child_route_headers.is_some())
            .field("renderer", &self.renderer.is_some())
            .field("error_handler", &self.error_handler.is_some())
            .field("response_schemas", &self.response_schemas.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RouterOptions {
    /// Registers or overrides a transformer.
    #[must_use]
    pub fn with_transformer<F>(mut self, name: impl Into<String>, transformer: F) -> Self
    where
        F: Fn(&serde_json::Value) -> Result<serde_json::Value, String> + Send + Sync + 'static,
    {
        self.transformers.register(name, transformer);
        self
    }

    /// Sets the child request header function.
    #[must_use]
    pub fn with_child_route_headers<F>(mut self, headers: F) -> Self
    where
        F: Fn(&Context) -> HeaderMap + Send + Sync + 'static,
    {
        self.child_route_headers = Some(Arc::new(headers));
        self
    }

    /// Sets the renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Sets the error handler.
    #[must_use]
    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Sets or replaces a default response schema.
    #[must_use]
    pub fn with_response_schema(mut self, status: impl Into<String>, schema: impl Into<Arc<Schema>>) -> Self {
        self.response_schemas.insert(status.into(), schema.into());
        self
    }

    /// Replaces every default response schema; an empty map disables them.
    #[must_use]
    pub fn with_response_schemas(mut self, schemas: BTreeMap<String, Arc<Schema>>) -> Self {
        self.response_schemas = schemas;
        self
    }
}

/// Compiles controllers into routes and registers them with a transport.
///
/// The transform and middleware caches live as long as the router, so
/// registering several batches of controllers shares compiled transforms
/// and generated hooks.
pub struct Router {
    config: RouterConfig,
    transforms: TransformCompiler,
    middleware: MiddlewareCache,
    children: ChildDispatcher,
    renderer: Option<Arc<dyn Renderer>>,
    error_handler: Arc<dyn ErrorHandler>,
    response_schemas: BTreeMap<String, Arc<Schema>>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("config", &self.config)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Creates a router with default options.
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Self::with_options(config, RouterOptions::default())
    }

    /// Creates a router.
    #[must_use]
    pub fn with_options(config: RouterConfig, options: RouterOptions) -> Self {
        let mut registry = TransformerRegistry::new();
        registry.merge(&options.transformers);
        let error_handler = options
            .error_handler
            .unwrap_or_else(|| Arc::new(DefaultErrorHandler::new(config.debug_errors)));

        Self {
            children: ChildDispatcher::new(
                config.enable_child_routes,
                options.child_route_headers,
                Arc::clone(&error_handler),
            ),
            transforms: TransformCompiler::new(registry),
            middleware: MiddlewareCache::new(),
            renderer: options.renderer,
            error_handler,
            response_schemas: options.response_schemas,
            config,
        }
    }

    /// The router configuration.
    #[must_use]
    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Dispatcher for child routes, shareable with handlers.
    #[must_use]
    pub fn child_dispatcher(&self) -> ChildDispatcher {
        self.children.clone()
    }

    /// The middleware cache.
    #[must_use]
    pub const fn middleware_cache(&self) -> &MiddlewareCache {
        &self.middleware
    }

    /// The transform compiler.
    #[must_use]
    pub const fn transform_compiler(&self) -> &TransformCompiler {
        &self.transforms
    }

    /// Compiles `controllers` and registers every route with `transport`,
    /// installing the router's error handler on it.
    ///
    /// Middleware applies to every route of the batch, in descending weight
    /// order. Any error aborts registration; routes registered before the
    /// failing one stay registered.
    pub async fn register(
        &self,
        controllers: Vec<ControllerDescriptor>,
        transport: &dyn Transport,
    ) -> Result<Vec<Arc<CompiledRoute>>, RouterError> {
        self.config.validate()?;

        let mut routes = Vec::new();
        let mut middlewares = Vec::new();
        for controller in controllers {
            match controller {
                ControllerDescriptor::Router(group) => {
                    let base = group.base_path;
                    routes.extend(group.routes.into_iter().map(|route| (base.clone(), route)));
                }
                ControllerDescriptor::Middleware(middleware) => middlewares.push(middleware),
            }
        }
        sort_by_weight(&mut middlewares);
        transport.set_error_handler(Arc::clone(&self.error_handler));

        if routes.iter().any(|(_, route)| route.metadata.raw_body) {
            tracing::debug!("installing raw body parser");
            transport.set_content_parser(Arc::new(RawBodyParser::new(Arc::new(JsonBodyParser))));
        }

        let mut compiled = Vec::with_capacity(routes.len());
        for (base, route) in routes {
            let route = Arc::new(self.compile(base.as_deref(), route, &middlewares).await?);
            transport.route(RouteRegistration {
                methods: route.method.expand(),
                path: route.path.clone(),
                route: Arc::clone(&route),
            })?;

            if self.children.is_enabled() && route.method.serves_get() {
                self.children
                    .insert(&route.path, Arc::clone(&route))
                    .map_err(|source| RouterError::Path {
                        method: HttpMethod::Get.to_string(),
                        path: route.path.clone(),
                        source,
                    })?;
            }

            tracing::info!(method = %route.method, path = %route.path, status = route.status.as_u16(), "registered route");
            compiled.push(route);
        }
        Ok(compiled)
    }

    async fn compile(
        &self,
        base: Option<&str>,
        route: RouteDescriptor,
        middlewares: &[MiddlewareDescriptor],
    ) -> Result<CompiledRoute, RouterError> {
        let RouteDescriptor {
            mut metadata,
            headers,
            bindings,
            handler,
        } = route;

        let method = metadata.method.ok_or_else(|| RouterError::MissingMethod {
            path: metadata.path.clone().unwrap_or_default(),
        })?;
        let sub_path = metadata.path.clone().ok_or_else(|| RouterError::MissingPath {
            method: method.to_string(),
        })?;
        let path = self.full_path(base, &sub_path, metadata.version);
        tracing::debug!(method = %method, path = %path, "registering route");

        metadata.path = Some(path.clone());
        let status = resolve_status(&metadata, method, &path)?;
        for (key, schema) in &self.response_schemas {
            metadata
                .schemas
                .response
                .entry(key.clone())
                .or_insert_with(|| Arc::clone(schema));
        }

        let mut hooks = RouteHooks::default();
        let input = InputTransforms {
            body: self.transform(metadata.schemas.body.as_ref(), TransformKind::Input)?,
            query: self.transform(metadata.schemas.query.as_ref(), TransformKind::Input)?,
            params: self.transform(metadata.schemas.params.as_ref(), TransformKind::Input)?,
        };
        if !input.is_empty() {
            hooks.pre_validation.push(Arc::new(input));
        }
        self.attach_middleware(&mut hooks, middlewares, &metadata, &path).await?;

        let mut outputs = BTreeMap::new();
        for (key, schema) in &metadata.schemas.response {
            if let Some(transform) = self.transform(Some(schema), TransformKind::Output)? {
                outputs.insert(key.clone(), transform);
            }
        }
        if !outputs.is_empty() {
            hooks
                .pre_serialization
                .push(Arc::new(ResponseTransforms { by_status: outputs }));
        }

        let masks = if self.config.mask_sensitive_data {
            LogMasks {
                query: self.transform(metadata.schemas.query.as_ref(), TransformKind::Mask)?,
                body: self.transform(metadata.schemas.body.as_ref(), TransformKind::Mask)?,
            }
        } else {
            LogMasks::default()
        };

        let headers = headers
            .into_iter()
            .map(|(name, source)| compile_header(&name, source, &path))
            .collect::<Result<Vec<_>, _>>()?;

        let redirect = metadata
            .redirect
            .as_deref()
            .map(|target| {
                let location = HeaderValue::try_from(target).map_err(|_| RouterError::InvalidRedirect {
                    target: target.to_string(),
                    path: path.clone(),
                })?;
                let status = metadata
                    .status
                    .map_or(StatusCode::MOVED_PERMANENTLY, |_| status);
                Ok::<_, RouterError>((location, status))
            })
            .transpose()?;

        let render = match &metadata.render {
            None => None,
            Some(target) => {
                let renderer = self.renderer.clone().ok_or_else(|| RouterError::MissingRenderer {
                    method: method.to_string(),
                    path: path.clone(),
                })?;
                let step = match target {
                    RenderTarget::Template(name) => RenderStep::Template(name.clone()),
                    RenderTarget::Dynamic => RenderStep::Dynamic,
                };
                Some((step, renderer))
            }
        };

        let validator = RouteValidator {
            body: metadata.schemas.body.clone(),
            params: metadata.schemas.params.clone(),
            query: metadata.schemas.query.clone(),
            silent: metadata.silent_validation,
        };

        Ok(CompiledRoute {
            method,
            path,
            metadata: Arc::new(metadata),
            status,
            headers,
            bindings,
            handler,
            hooks,
            validator,
            masks,
            redirect,
            render,
        })
    }

    async fn attach_middleware(
        &self,
        hooks: &mut RouteHooks,
        middlewares: &[MiddlewareDescriptor],
        metadata: &RouteMetadata,
        path: &str,
    ) -> Result<(), RouterError> {
        for middleware in middlewares {
            let Some(hook) = self.middleware.resolve(middleware, metadata).await? else {
                tracing::debug!(middleware = middleware.name(), path, "middleware skipped route");
                continue;
            };
            let mismatch = |produced| RouterError::HookKindMismatch {
                middleware: middleware.name().to_string(),
                kind: middleware.kind(),
                produced,
            };
            match (middleware.kind(), hook) {
                (HookKind::OnError, RouteHook::Error(hook)) => hooks.on_error.push(hook),
                (HookKind::OnError, RouteHook::Request(_)) => return Err(mismatch("request")),
                (_, RouteHook::Error(_)) => return Err(mismatch("error")),
                (kind, RouteHook::Request(hook)) => hooks.push(kind, hook),
            }
            tracing::debug!(
                middleware = middleware.name(),
                kind = %middleware.kind(),
                weight = middleware.ordering_weight(),
                path,
                "attached middleware"
            );
        }
        Ok(())
    }

    fn transform(
        &self,
        schema: Option<&Arc<Schema>>,
        kind: TransformKind,
    ) -> Result<Option<Arc<CompiledTransform>>, RouterError> {
        let Some(schema) = schema else {
            return Ok(None);
        };
        let transform = self.transforms.compile(schema, kind)?;
        Ok((!transform.is_noop()).then_some(transform))
    }

    fn full_path(&self, base: Option<&str>, sub_path: &str, version: Option<u32>) -> String {
        let version = self
            .config
            .prefix_versioning
            .then(|| format!("v{}", version.unwrap_or(1)));
        let parts = [
            self.config.route_prefix.as_deref(),
            version.as_deref(),
            base,
            Some(sub_path),
        ];
        let segments: Vec<&str> = parts
            .into_iter()
            .flatten()
            .flat_map(|part| part.split('/'))
            .filter(|segment| !segment.is_empty())
            .collect();
        format!("/{}", segments.join("/"))
    }
}

fn resolve_status(metadata: &RouteMetadata, method: HttpMethod, path: &str) -> Result<StatusCode, RouterError> {
    if let Some(code) = metadata.status {
        return StatusCode::from_u16(code).map_err(|_| RouterError::InvalidStatus {
            status: code,
            path: path.to_string(),
        });
    }
    if let [single] = metadata.schemas.declared_statuses().as_slice() {
        if let Ok(status) = StatusCode::from_u16(*single) {
            return Ok(status);
        }
    }
    Ok(if method == HttpMethod::Post {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    })
}

fn compile_header(
    name: &str,
    source: HeaderSource,
    path: &str,
) -> Result<(HeaderName, CompiledHeader), RouterError> {
    let invalid = |reason: String| RouterError::InvalidHeader {
        name: name.to_string(),
        path: path.to_string(),
        reason,
    };
    let header_name = HeaderName::try_from(name).map_err(|e| invalid(e.to_string()))?;
    let compiled = match source {
        HeaderSource::Static(value) => {
            CompiledHeader::Static(HeaderValue::try_from(value).map_err(|e| invalid(e.to_string()))?)
        }
        HeaderSource::Computed(compute) => CompiledHeader::Computed(compute),
    };
    Ok((header_name, compiled))
}

/// Shape of the default error body.
fn error_body_schema() -> Schema {
    Schema::object()
        .with_id(ERROR_BODY_SCHEMA_ID)
        .required_property("code", Schema::string())
        .required_property("type", Schema::string())
        .required_property("message", Schema::string())
        .property(
            "fields",
            Schema::array(
                Schema::object()
                    .property("field", Schema::string())
                    .property("msg", Schema::string()),
            ),
        )
        .property("stack", Schema::string())
}
