//! Request and reply types shared by every stage of a route pipeline.
//!
//! A [`RouteRequest`] is exclusively borrowed by the stage that runs, while a
//! [`Reply`] is a cheap shared handle: the context store, hooks and the
//! handler can all hold one and write status, headers or a body into it.
//! Nothing here performs I/O; the transport (or the child dispatcher) reads
//! the final state once the pipeline finishes.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, LOCATION};
use http::{HeaderMap, Method, StatusCode, Uri};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::FieldError;

/// Header carrying the calling service name, copied into the request log.
pub const SERVICE_HEADER: &str = "x-service";

/// The immutable head of a request, as stored in the request context.
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// Request method.
    pub method: Method,
    /// Request target (path and query).
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
}

impl RequestHead {
    /// Creates a head with no headers.
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
        }
    }
}

/// A request travelling through a compiled route.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    /// Request id (the context RID).
    pub id: String,
    /// Request method.
    pub method: Method,
    /// Request target.
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
    /// Path parameters extracted by the path matcher.
    pub params: Map<String, Value>,
    /// Parsed query string.
    pub query: Map<String, Value>,
    /// Parsed body, `Null` when there is none.
    pub body: Value,
    /// Original body bytes, kept only for routes that ask for them.
    pub raw_body: Option<Bytes>,
    /// Validation failures attached instead of raised (silent validation).
    pub validation_error: Option<Vec<FieldError>>,
}

impl RouteRequest {
    /// Creates an empty request.
    #[must_use]
    pub fn new(id: impl Into<String>, method: Method, uri: Uri) -> Self {
        Self {
            id: id.into(),
            method,
            uri,
            headers: HeaderMap::new(),
            params: Map::new(),
            query: Map::new(),
            body: Value::Null,
            raw_body: None,
            validation_error: None,
        }
    }

    /// Copies out the request head.
    #[must_use]
    pub fn head(&self) -> RequestHead {
        RequestHead {
            method: self.method.clone(),
            uri: self.uri.clone(),
            headers: self.headers.clone(),
        }
    }

    /// Path and query, as received.
    #[must_use]
    pub fn url(&self) -> String {
        self.uri
            .path_and_query()
            .map_or_else(|| self.uri.path().to_string(), ToString::to_string)
    }

    /// Returns a header as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a path parameter as a string.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }
}

/// One structured request log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLog {
    /// Request id.
    pub rid: String,
    /// Request method.
    pub method: String,
    /// Request url.
    pub url: String,
    /// Final status.
    pub status: u16,
    /// Calling service, from the `x-service` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Elapsed time in milliseconds, three decimals.
    pub time_taken: String,
    /// Query, masked when masking is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    /// Body, masked when masking is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Captured outcome of a child route.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildRouteResult {
    /// Final status.
    pub status_code: StatusCode,
    /// Headers written by the route.
    pub headers: HeaderMap,
    /// Body sent by the route, an empty object when nothing was sent.
    pub body: Value,
    /// The child's request log record, unless logging was disabled.
    pub request_log: Option<RequestLog>,
}

#[derive(Debug)]
struct ReplyState {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Value>,
    sent: bool,
    log: Option<RequestLog>,
}

impl Default for ReplyState {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: None,
            sent: false,
            log: None,
        }
    }
}

/// Shared response sink.
///
/// Clones refer to the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    state: Arc<Mutex<ReplyState>>,
}

impl Reply {
    /// Creates a fresh reply with status 200.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.state.lock().status
    }

    /// Sets the status.
    pub fn set_status(&self, status: StatusCode) -> &Self {
        self.state.lock().status = status;
        self
    }

    /// Sets a header, replacing any previous value.
    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) -> &Self {
        self.state.lock().headers.insert(name, value);
        self
    }

    /// Returns a copy of the headers.
    #[must_use]
    pub fn headers(&self) -> HeaderMap {
        self.state.lock().headers.clone()
    }

    /// Returns a header as a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    }

    /// Sends a body. A reply can only be sent once; later calls are ignored.
    pub fn send(&self, body: Value) -> &Self {
        let mut state = self.state.lock();
        if state.sent {
            tracing::warn!(status = state.status.as_u16(), "reply already sent, ignoring body");
            return self;
        }
        state.body = Some(body);
        state.sent = true;
        self
    }

    /// Redirects to `location` with `status`.
    pub fn redirect(&self, location: HeaderValue, status: StatusCode) -> &Self {
        let mut state = self.state.lock();
        state.status = status;
        state.headers.insert(LOCATION, location);
        state.sent = true;
        self
    }

    /// Whether a body (or redirect) has been sent.
    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.state.lock().sent
    }

    /// Returns a copy of the body, if any.
    #[must_use]
    pub fn body(&self) -> Option<Value> {
        self.state.lock().body.clone()
    }

    /// Whether a body has been written.
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.state.lock().body.is_some()
    }

    /// Mutates the body in place, if any.
    pub fn update_body<R>(&self, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        self.state.lock().body.as_mut().map(f)
    }

    /// Stores the request log record produced for this reply.
    pub fn set_request_log(&self, log: RequestLog) {
        self.state.lock().log = Some(log);
    }

    /// The request log record, once the request has finished.
    #[must_use]
    pub fn request_log(&self) -> Option<RequestLog> {
        self.state.lock().log.clone()
    }

    /// Snapshot of the reply as a child route result.
    #[must_use]
    pub fn child_result(&self) -> ChildRouteResult {
        let state = self.state.lock();
        ChildRouteResult {
            status_code: state.status,
            headers: state.headers.clone(),
            body: state
                .body
                .clone()
                .unwrap_or_else(|| Value::Object(Map::new())),
            request_log: state.log.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_clones_share_state() {
        let reply = Reply::new();
        let other = reply.clone();
        other.set_status(StatusCode::CREATED);
        other.send(json!({ "ok": true }));
        assert_eq!(reply.status(), StatusCode::CREATED);
        assert!(reply.is_sent());
        assert_eq!(reply.body(), Some(json!({ "ok": true })));
    }

    #[test]
    fn test_second_send_is_ignored() {
        let reply = Reply::new();
        reply.send(json!(1));
        reply.send(json!(2));
        assert_eq!(reply.body(), Some(json!(1)));
    }

    #[test]
    fn test_redirect_sets_location() {
        let reply = Reply::new();
        reply.redirect(HeaderValue::from_static("/login"), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(reply.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(reply.header("location").as_deref(), Some("/login"));
        assert!(reply.is_sent());
        assert!(!reply.has_body());
    }

    #[test]
    fn test_child_result_defaults_to_empty_object() {
        let reply = Reply::new();
        let result = reply.child_result();
        assert_eq!(result.status_code, StatusCode::OK);
        assert_eq!(result.body, json!({}));
    }

    #[test]
    fn test_request_url_and_params() {
        let mut request =
            RouteRequest::new("rid", Method::GET, "/items/42?x=1".parse().unwrap());
        request.params.insert("id".into(), json!("42"));
        assert_eq!(request.url(), "/items/42?x=1");
        assert_eq!(request.param("id"), Some("42"));
    }
}
