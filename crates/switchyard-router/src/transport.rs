//! The transport seam.
//!
//! The router never touches sockets. It hands every compiled route to a
//! [`Transport`], which is responsible for matching incoming requests,
//! parsing bodies and calling [`CompiledRoute::dispatch`] with its error
//! handler. Every failed external request, routed or not, is answered by
//! that one handler. Socket-level
//! engines implement the trait outside this crate; [`MemoryTransport`] is the
//! in-process implementation used for tests and embedding.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode, Uri};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use switchyard_core::route::RouteMetadata;
use switchyard_core::{ErrorCode, Reply, RequestLog, RouteError, RouteRequest};
use uuid::Uuid;

use crate::chain::{log_request, CompiledRoute, DispatchMode, LogMasks};
use crate::error::RouterError;
use crate::error_handler::{DefaultErrorHandler, ErrorHandler};
use crate::path::PathIndex;

/// Header carrying a caller-supplied request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// One route handed to a transport.
#[derive(Debug, Clone)]
pub struct RouteRegistration {
    /// Concrete methods to serve.
    pub methods: Vec<Method>,
    /// Full path template.
    pub path: String,
    /// The compiled pipeline.
    pub route: Arc<CompiledRoute>,
}

/// An HTTP engine the router registers routes with.
pub trait Transport: Send + Sync {
    /// Registers a route.
    fn route(&self, registration: RouteRegistration) -> Result<(), RouterError>;

    /// Replaces the body parser.
    fn set_content_parser(&self, parser: Arc<dyn ContentParser>);

    /// Replaces the error handler used for every failed request.
    fn set_error_handler(&self, handler: Arc<dyn ErrorHandler>);
}

/// A parsed request body.
#[derive(Debug, Clone, Default)]
pub struct ParsedBody {
    /// The parsed value, `Null` for an empty body.
    pub value: Value,
    /// The original bytes, when the route asked for them.
    pub raw: Option<Bytes>,
}

/// Turns request bytes into a body value, per route.
pub trait ContentParser: Send + Sync {
    /// Parses `body` for the route described by `metadata`.
    fn parse(&self, metadata: &RouteMetadata, body: &Bytes) -> Result<ParsedBody, RouteError>;
}

/// Parses JSON bodies. An empty body parses to `Null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBodyParser;

impl ContentParser for JsonBodyParser {
    fn parse(&self, _metadata: &RouteMetadata, body: &Bytes) -> Result<ParsedBody, RouteError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(ParsedBody::default());
        }
        let value = serde_json::from_slice(body).map_err(|e| {
            RouteError::http_with_message(ErrorCode::S006, format!("request body is not valid JSON: {e}"))
        })?;
        Ok(ParsedBody { value, raw: None })
    }
}

/// Keeps the original bytes for routes flagged `raw_body`, then delegates.
pub struct RawBodyParser {
    inner: Arc<dyn ContentParser>,
}

impl RawBodyParser {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn ContentParser>) -> Self {
        Self { inner }
    }
}

impl fmt::Debug for RawBodyParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBodyParser").finish_non_exhaustive()
    }
}

impl ContentParser for RawBodyParser {
    fn parse(&self, metadata: &RouteMetadata, body: &Bytes) -> Result<ParsedBody, RouteError> {
        let raw = metadata.raw_body.then(|| body.clone());
        let mut parsed = self.inner.parse(metadata, body)?;
        parsed.raw = raw;
        Ok(parsed)
    }
}

/// Parses a query string. Repeated keys collect into an array.
pub(crate) fn parse_query(query: Option<&str>) -> Map<String, Value> {
    let mut parsed = Map::new();
    let Some(query) = query else {
        return parsed;
    };
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(value.into_owned());
        match parsed.get_mut(key.as_ref()) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                parsed.insert(key.into_owned(), value);
            }
        }
    }
    parsed
}

/// In-process transport.
///
/// ```
/// use serde_json::json;
/// use switchyard_router::{handler_fn, MemoryTransport, MockRequest, RouteDescriptor, Router, RouterController};
/// use switchyard_config::RouterConfig;
///
/// # tokio_test::block_on(async {
/// let transport = MemoryTransport::new();
/// let router = Router::new(RouterConfig::default());
/// let health = RouterController::root()
///     .route(RouteDescriptor::get("/health", handler_fn(|_| async { Ok(json!({ "ok": true })) })));
/// router.register(vec![health.into()], &transport).await.unwrap();
///
/// let response = transport.inject(MockRequest::get("/health")).await.unwrap();
/// assert_eq!(response.status, 200);
/// assert_eq!(response.body, Some(json!({ "ok": true })));
/// # });
/// ```
pub struct MemoryTransport {
    routes: RwLock<HashMap<Method, PathIndex<Arc<CompiledRoute>>>>,
    parser: RwLock<Arc<dyn ContentParser>>,
    error_handler: RwLock<Arc<dyn ErrorHandler>>,
    trust_request_id: bool,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            parser: RwLock::new(Arc::new(JsonBodyParser)),
            error_handler: RwLock::new(Arc::new(DefaultErrorHandler::default())),
            trust_request_id: false,
        }
    }
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("routes", &self.route_count())
            .field("trust_request_id", &self.trust_request_id)
            .finish_non_exhaustive()
    }
}

impl MemoryTransport {
    /// Creates a transport with the JSON parser and the default error
    /// handler. Registering routes replaces the handler with the router's.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the request id from `x-request-id` when present.
    #[must_use]
    pub const fn trust_request_id(mut self, trust: bool) -> Self {
        self.trust_request_id = trust;
        self
    }

    /// Number of method/path pairs registered.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.read().values().map(PathIndex::len).sum()
    }

    /// Runs a request through the matching route.
    ///
    /// Unmatched requests, undecodable paths and unparsable bodies are
    /// answered by the error handler and still logged. Only fatal pipeline
    /// errors surface as `Err`.
    pub async fn inject(&self, mock: MockRequest) -> Result<MockResponse, RouteError> {
        let started = Instant::now();
        let reply = Reply::new();
        let error_handler = Arc::clone(&*self.error_handler.read());
        let (mut request, body, malformed) = mock.into_parts(self.trust_request_id);
        if let Some(error) = malformed {
            return self.reject(&error, &request, &reply, &LogMasks::default(), started);
        }

        let found = self
            .routes
            .read()
            .get(&request.method)
            .map_or(Ok(None), |index| index.find(request.uri.path()))
            .map(|found| found.map(|(route, params)| (Arc::clone(route), params)));

        let (route, params) = match found {
            Ok(Some(found)) => found,
            Ok(None) => {
                tracing::debug!(rid = %request.id, method = %request.method, url = %request.url(), "no route matched");
                let error = RouteError::http(ErrorCode::S002);
                return self.reject(&error, &request, &reply, &LogMasks::default(), started);
            }
            Err(source) => {
                let error = RouteError::http_with_message(ErrorCode::S006, source.to_string());
                return self.reject(&error, &request, &reply, &LogMasks::default(), started);
            }
        };
        request.params = params;

        let parser = Arc::clone(&*self.parser.read());
        match parser.parse(route.metadata(), &body) {
            Ok(parsed) => {
                request.body = parsed.value;
                request.raw_body = parsed.raw;
            }
            Err(error) => return self.reject(&error, &request, &reply, &route.masks, started),
        }

        route.dispatch(request, reply.clone(), &*error_handler).await?;
        Ok(MockResponse::from_reply(&reply))
    }

    fn reject(
        &self,
        error: &RouteError,
        request: &RouteRequest,
        reply: &Reply,
        masks: &LogMasks,
        started: Instant,
    ) -> Result<MockResponse, RouteError> {
        self.error_handler.read().handle(error, request, reply);
        log_request(request, reply, DispatchMode::External, started.elapsed(), masks)?;
        Ok(MockResponse::from_reply(reply))
    }
}

fn request_id(headers: &HeaderMap, trusted: bool) -> String {
    trusted
        .then(|| headers.get(REQUEST_ID_HEADER))
        .flatten()
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map_or_else(|| Uuid::now_v7().to_string(), ToString::to_string)
}

impl Transport for MemoryTransport {
    fn route(&self, registration: RouteRegistration) -> Result<(), RouterError> {
        let mut routes = self.routes.write();
        for method in &registration.methods {
            routes
                .entry(method.clone())
                .or_default()
                .insert(&registration.path, Arc::clone(&registration.route))
                .map_err(|source| RouterError::Path {
                    method: method.to_string(),
                    path: registration.path.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    fn set_content_parser(&self, parser: Arc<dyn ContentParser>) {
        *self.parser.write() = parser;
    }

    fn set_error_handler(&self, handler: Arc<dyn ErrorHandler>) {
        *self.error_handler.write() = handler;
    }
}

/// A request for [`MemoryTransport::inject`].
#[derive(Debug, Clone)]
pub struct MockRequest {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl MockRequest {
    /// A request with `method` for `uri` (`/path?query`).
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// A GET request.
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri)
    }

    /// A POST request.
    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn json(self, body: &Value) -> Self {
        self.header(CONTENT_TYPE.as_str(), "application/json")
            .body(body.to_string())
    }

    /// Sets raw body bytes.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Splits into the route request and the unparsed body. A malformed
    /// target or header is returned alongside instead of failing outright,
    /// so it can still be answered through the error handler.
    fn into_parts(self, trust_request_id: bool) -> (RouteRequest, Bytes, Option<RouteError>) {
        let mut malformed = None;
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => malformed = Some(format!("invalid header '{name}'")),
            }
        }

        let uri = self.uri.parse::<Uri>().unwrap_or_else(|_| {
            malformed = Some(format!("invalid request target '{}'", self.uri));
            Uri::from_static("/")
        });

        let mut request = RouteRequest::new(request_id(&headers, trust_request_id), self.method, uri);
        request.headers = headers;
        request.query = parse_query(request.uri.query());

        let error = malformed.map(|message| RouteError::http_with_message(ErrorCode::S006, message));
        (request, self.body, error)
    }
}

/// What [`MemoryTransport::inject`] captured.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Final status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Sent body, if any.
    pub body: Option<Value>,
    /// The request log record, unless logging was disabled.
    pub request_log: Option<RequestLog>,
}

impl MockResponse {
    fn from_reply(reply: &Reply) -> Self {
        Self {
            status: reply.status(),
            headers: reply.headers(),
            body: reply.body(),
            request_log: reply.request_log(),
        }
    }

    /// Deserializes the body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone().unwrap_or(Value::Null))
    }

    /// Returns a header as a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_query_repeats_into_array() {
        let query = parse_query(Some("tag=a&tag=b&tag=c&page=2&q=hello%20world"));
        assert_eq!(query.get("tag"), Some(&json!(["a", "b", "c"])));
        assert_eq!(query.get("page"), Some(&json!("2")));
        assert_eq!(query.get("q"), Some(&json!("hello world")));
        assert!(parse_query(None).is_empty());
    }

    #[test]
    fn test_json_parser() {
        let metadata = RouteMetadata::default();
        let parsed = JsonBodyParser.parse(&metadata, &Bytes::from_static(b"{\"a\":1}")).unwrap();
        assert_eq!(parsed.value, json!({ "a": 1 }));
        assert!(parsed.raw.is_none());

        let empty = JsonBodyParser.parse(&metadata, &Bytes::new()).unwrap();
        assert!(empty.value.is_null());

        let error = JsonBodyParser
            .parse(&metadata, &Bytes::from_static(b"{nope"))
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::S006);
    }

    #[test]
    fn test_raw_parser_is_gated_per_route() {
        let parser = RawBodyParser::new(Arc::new(JsonBodyParser));
        let body = Bytes::from_static(b"{\"a\":1}");

        let plain = RouteMetadata::default();
        assert!(parser.parse(&plain, &body).unwrap().raw.is_none());

        let raw = RouteMetadata {
            raw_body: true,
            ..RouteMetadata::default()
        };
        let parsed = parser.parse(&raw, &body).unwrap();
        assert_eq!(parsed.raw, Some(body));
        assert_eq!(parsed.value, json!({ "a": 1 }));
    }

    #[test]
    fn test_request_id_trust() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("abc-123"));

        assert_eq!(request_id(&headers, true), "abc-123");

        let id = request_id(&headers, false);
        assert_ne!(id, "abc-123");
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[tokio::test]
    async fn test_unmatched_request_is_s002() {
        let transport = MemoryTransport::new();
        let response = transport.inject(MockRequest::get("/missing")).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let body = response.body.unwrap();
        assert_eq!(body["code"], json!("S002"));
        assert_eq!(body["message"], json!("The requested endpoint does not exist"));

        let log = response.request_log.unwrap();
        assert_eq!(log.url, "/missing");
        assert_eq!(log.status, 404);
    }

    struct Teapot;

    impl ErrorHandler for Teapot {
        fn handle(&self, _error: &RouteError, _request: &RouteRequest, reply: &Reply) {
            reply.set_status(StatusCode::IM_A_TEAPOT);
            reply.send(json!({ "custom": true }));
        }
    }

    #[tokio::test]
    async fn test_error_handler_can_be_replaced() {
        let transport = MemoryTransport::new();
        transport.set_error_handler(Arc::new(Teapot));

        let response = transport
            .inject(MockRequest::get("/missing").header("bad header", "x"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
        assert_eq!(response.body, Some(json!({ "custom": true })));
        assert_eq!(response.request_log.unwrap().status, 418);
    }
}
