//! Declarative route metadata.
//!
//! [`RouteMetadata`] is the serializable part of a route declaration: the
//! part the host framework produces from its annotations and that dynamic
//! middleware generators inspect. Handlers and computed headers are not
//! metadata and live on the router's route descriptor instead.

use crate::schema::Schema;
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// HTTP methods a route can be declared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `OPTIONS`
    Options,
    /// `HEAD`
    Head,
    /// Every concrete method above.
    All,
}

impl HttpMethod {
    const CONCRETE: [Self; 7] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Patch,
        Self::Delete,
        Self::Options,
        Self::Head,
    ];

    /// Expands the declared method into the methods it registers.
    #[must_use]
    pub fn expand(self) -> Vec<Method> {
        match self {
            Self::All => Self::CONCRETE.iter().filter_map(|m| m.as_method()).collect(),
            other => other.as_method().into_iter().collect(),
        }
    }

    /// The concrete [`Method`], `None` for [`HttpMethod::All`].
    #[must_use]
    pub fn as_method(self) -> Option<Method> {
        Some(match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Patch => Method::PATCH,
            Self::Delete => Method::DELETE,
            Self::Options => Method::OPTIONS,
            Self::Head => Method::HEAD,
            Self::All => return None,
        })
    }

    /// Whether routes declared with this method can serve `GET`.
    #[must_use]
    pub const fn serves_get(self) -> bool {
        matches!(self, Self::Get | Self::All)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
            Self::All => "ALL",
        })
    }
}

/// What a route renders instead of sending its return value.
///
/// Serialized as the template name, or `true` for [`RenderTarget::Dynamic`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RenderRepr", into = "RenderRepr")]
pub enum RenderTarget {
    /// A fixed template; the handler's return value is the template data.
    Template(String),
    /// The handler returns `{ "template": ..., "data": ... }`.
    Dynamic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RenderRepr {
    Flag(bool),
    Name(String),
}

impl TryFrom<RenderRepr> for RenderTarget {
    type Error = String;

    fn try_from(repr: RenderRepr) -> Result<Self, Self::Error> {
        match repr {
            RenderRepr::Flag(true) => Ok(Self::Dynamic),
            RenderRepr::Flag(false) => Err("render target must be a template name or true".into()),
            RenderRepr::Name(name) => Ok(Self::Template(name)),
        }
    }
}

impl From<RenderTarget> for RenderRepr {
    fn from(target: RenderTarget) -> Self {
        match target {
            RenderTarget::Dynamic => Self::Flag(true),
            RenderTarget::Template(name) => Self::Name(name),
        }
    }
}

/// Schemas declared for the parts of a request and for responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSchemas {
    /// Request body schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Arc<Schema>>,
    /// Path parameter schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Arc<Schema>>,
    /// Query string schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Arc<Schema>>,
    /// Response schemas keyed by status (`"200"`) or status class (`"4xx"`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response: BTreeMap<String, Arc<Schema>>,
}

impl RouteSchemas {
    /// Numeric response codes in `[200, 600)` declared by the response map.
    #[must_use]
    pub fn declared_statuses(&self) -> Vec<u16> {
        self.response
            .keys()
            .filter_map(|key| key.parse::<u16>().ok())
            .filter(|code| (200..600).contains(code))
            .collect()
    }
}

/// Serializable route declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMetadata {
    /// Declared method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    /// Route path. Holds the sub-path when declared and the full resolved
    /// path once compiled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// API version used for `/v{n}` prefixing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Explicit status code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Redirect target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    /// Render target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render: Option<RenderTarget>,
    /// Keep the raw request bytes next to the parsed body.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub raw_body: bool,
    /// Attach validation failures to the request instead of failing it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub silent_validation: bool,
    /// Declared schemas.
    #[serde(default)]
    pub schemas: RouteSchemas,
    /// Any other metadata the host framework attached (auth rules, tags, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RouteMetadata {
    /// Creates metadata for a method and sub-path.
    #[must_use]
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method: Some(method),
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Looks up a free-form metadata entry.
    #[must_use]
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_expands_to_every_method() {
        let methods = HttpMethod::All.expand();
        assert_eq!(methods.len(), 7);
        assert!(methods.contains(&Method::GET));
        assert!(methods.contains(&Method::DELETE));
        assert_eq!(HttpMethod::Post.expand(), vec![Method::POST]);
    }

    #[test]
    fn test_declared_statuses_ignore_classes() {
        let mut schemas = RouteSchemas::default();
        for key in ["201", "202", "4xx", "700"] {
            schemas.response.insert(key.into(), Arc::new(Schema::object()));
        }
        assert_eq!(schemas.declared_statuses(), vec![201, 202]);
    }

    #[test]
    fn test_metadata_from_json() {
        let metadata: RouteMetadata = serde_json::from_value(json!({
            "method": "GET",
            "path": "/:id",
            "render": true,
            "rawBody": true,
            "auth": { "roles": ["admin"] }
        }))
        .unwrap();
        assert_eq!(metadata.method, Some(HttpMethod::Get));
        assert_eq!(metadata.render, Some(RenderTarget::Dynamic));
        assert!(metadata.raw_body);
        assert_eq!(metadata.extra("auth"), Some(&json!({ "roles": ["admin"] })));

        let back = serde_json::to_value(&metadata).unwrap();
        assert_eq!(back["render"], json!(true));
        assert_eq!(back["auth"]["roles"][0], json!("admin"));
    }

    #[test]
    fn test_render_false_is_rejected() {
        let result: Result<RouteMetadata, _> = serde_json::from_value(json!({ "render": false }));
        assert!(result.is_err());
    }
}
