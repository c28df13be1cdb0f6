//! Error types for Switchyard.
//!
//! Two families of errors live here:
//!
//! - [`ContextError`] describes misuse of the request context (operating
//!   outside a scope, illegal nesting, missing required keys). These are
//!   programmer errors.
//! - [`RouteError`] is the error type that flows through a compiled route
//!   pipeline. Validation and HTTP errors are data and always end up as a
//!   well-formed response; context and configuration errors are *fatal* and
//!   are never turned into user-facing responses.
//!
//! Public error codes (`S001`..`S010`) are described by [`ErrorCode`], and the
//! serialized response body by [`ErrorBody`].

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using [`RouteError`].
pub type RouteResult<T> = Result<T, RouteError>;

/// Broad classification of a public error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    /// The client sent something the server cannot process.
    ClientError,
    /// A transport level HTTP error.
    HttpError,
    /// The endpoint or resource does not exist.
    NotFound,
    /// Something failed on the server side.
    ServerError,
    /// Credentials are missing or invalid.
    Unauthenticated,
    /// Credentials are valid but not sufficient.
    Unauthorized,
    /// Input failed schema validation.
    ValidationError,
    /// The operation conflicts with existing state.
    Conflict,
}

impl ErrorType {
    /// Returns the default HTTP status for this error type.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::ClientError | Self::HttpError => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict => StatusCode::CONFLICT,
        }
    }
}

/// Public server error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Unexpected server error.
    S001,
    /// The requested endpoint does not exist.
    S002,
    /// Input validation failed.
    S003,
    /// Authentication required.
    S004,
    /// Insufficient permissions.
    S005,
    /// Malformed request.
    S006,
    /// Rate limit exceeded.
    S007,
    /// Resource conflict.
    S008,
    /// Resource not found.
    S009,
    /// Blocked by security policy.
    S010,
}

impl ErrorCode {
    /// Returns the code as it appears in response bodies.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::S001 => "S001",
            Self::S002 => "S002",
            Self::S003 => "S003",
            Self::S004 => "S004",
            Self::S005 => "S005",
            Self::S006 => "S006",
            Self::S007 => "S007",
            Self::S008 => "S008",
            Self::S009 => "S009",
            Self::S010 => "S010",
        }
    }

    /// Returns the error type for this code.
    #[must_use]
    pub const fn error_type(self) -> ErrorType {
        match self {
            Self::S001 => ErrorType::ServerError,
            Self::S002 | Self::S009 => ErrorType::NotFound,
            Self::S003 => ErrorType::ValidationError,
            Self::S004 => ErrorType::Unauthenticated,
            Self::S005 | Self::S010 => ErrorType::Unauthorized,
            Self::S006 | Self::S007 => ErrorType::ClientError,
            Self::S008 => ErrorType::Conflict,
        }
    }

    /// Returns the HTTP status for this code.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::S007 => StatusCode::TOO_MANY_REQUESTS,
            other => other.error_type().status(),
        }
    }

    /// Returns the default client-facing message.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::S001 => "An unexpected server error occurred while processing the request",
            Self::S002 => "The requested endpoint does not exist",
            Self::S003 => {
                "The provided input data is invalid or does not meet validation requirements"
            }
            Self::S004 => "Authentication credentials are required to access this resource",
            Self::S005 => "Access denied due to insufficient permissions to perform this operation",
            Self::S006 => "The request is malformed or contains invalid parameters",
            Self::S007 => "Rate limit exceeded due to too many requests sent in a given time frame",
            Self::S008 => "Resource conflict as the requested operation conflicts with existing data",
            Self::S009 => "The requested resource could not be found",
            Self::S010 => "Access blocked due to security policy restrictions",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the request context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// No context scope is active for the current task.
    #[error("Context not yet initialized")]
    NotInitialized,

    /// A child scope was requested from inside another child scope.
    #[error("Cannot create a child context within an existing child context")]
    NestedChild,

    /// A required key is absent from the active store.
    #[error("Key '{key}' not found in the context")]
    KeyNotFound {
        /// The missing key.
        key: String,
    },

    /// A required key is absent from the parent store.
    #[error("Key '{key}' not found in the parent context")]
    ParentKeyNotFound {
        /// The missing key.
        key: String,
    },

    /// The stored value has a different type than the one requested.
    #[error("Key '{key}' holds a value of a different type")]
    TypeMismatch {
        /// The offending key.
        key: String,
    },
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted path of the offending field, e.g. `params.id`.
    pub field: String,
    /// What is wrong with it.
    pub msg: String,
}

impl FieldError {
    /// Creates a field error.
    pub fn new(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            msg: msg.into(),
        }
    }
}

/// Error type flowing through a route pipeline.
///
/// # Example
///
/// ```
/// use switchyard_core::{ErrorCode, RouteError};
///
/// fn find_user(id: &str) -> Result<String, RouteError> {
///     if id.is_empty() {
///         return Err(RouteError::http(ErrorCode::S009));
///     }
///     Ok(id.to_string())
/// }
///
/// assert!(find_user("").is_err());
/// ```
#[derive(Debug, Error)]
pub enum RouteError {
    /// Input failed schema validation.
    #[error("Validation error: {message}")]
    Validation {
        /// Summary message.
        message: String,
        /// One entry per offending field.
        fields: Vec<FieldError>,
    },

    /// An error with a public error code.
    #[error("{code}: {message}")]
    Http {
        /// Public error code.
        code: ErrorCode,
        /// Client-facing message.
        message: String,
    },

    /// Unexpected failure inside a handler or middleware.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message (not exposed to clients).
        message: String,
        /// The underlying error.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Misuse of the request context.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Invalid route or router configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RouteError {
    /// Creates a validation error from field errors.
    #[must_use]
    pub fn validation(fields: Vec<FieldError>) -> Self {
        let message = match fields.as_slice() {
            [single] => format!("{} {}", single.field, single.msg),
            many => format!("{} fields failed validation", many.len()),
        };
        Self::Validation { message, fields }
    }

    /// Creates an error with a public code and its default message.
    #[must_use]
    pub fn http(code: ErrorCode) -> Self {
        Self::Http {
            code,
            message: code.message().to_string(),
        }
    }

    /// Creates an error with a public code and a custom message.
    #[must_use]
    pub fn http_with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Http {
            code,
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether this error must bypass error hooks and the error handler.
    ///
    /// Context misuse and configuration errors signal a programming bug and
    /// are propagated to the caller unchanged.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Context(_) | Self::Configuration(_))
    }

    /// Returns the public code this error maps to.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::S003,
            Self::Http { code, .. } => *code,
            Self::Internal { .. } | Self::Context(_) | Self::Configuration(_) => ErrorCode::S001,
        }
    }

    /// Returns the HTTP status this error maps to.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.code().status()
    }

    /// Returns the field errors, if this is a validation error.
    #[must_use]
    pub fn fields(&self) -> Option<&[FieldError]> {
        match self {
            Self::Validation { fields, .. } => Some(fields),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for RouteError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal {
            message: error.to_string(),
            source: Some(error),
        }
    }
}

/// Serialized error response body.
///
/// ```json
/// {
///   "code": "S003",
///   "type": "VALIDATION_ERROR",
///   "message": "The provided input data is invalid or does not meet validation requirements",
///   "fields": [{ "field": "params.id", "msg": "must match pattern \"^\\d+$\"" }]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Public error code.
    pub code: ErrorCode,
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    /// Client-facing message.
    pub message: String,
    /// Per-field validation failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
    /// Debug detail, only present when debug errors are enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorBody {
    /// Creates a body for a code with its default message.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            error_type: code.error_type(),
            message: code.message().to_string(),
            fields: None,
            stack: None,
        }
    }

    /// Builds the client-facing body for an error.
    ///
    /// Internal failures collapse to the generic `S001` message; the detail is
    /// only attached (as `stack`) when `debug` is set.
    #[must_use]
    pub fn from_error(error: &RouteError, debug: bool) -> Self {
        let mut body = Self::from_code(error.code());
        match error {
            RouteError::Validation { fields, .. } => body.fields = Some(fields.clone()),
            RouteError::Http { message, .. } => body.message.clone_from(message),
            _ => {}
        }
        if debug {
            body.stack = Some(error_chain(error));
        }
        body
    }

    /// Converts the body into a JSON value.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_code_statuses() {
        assert_eq!(ErrorCode::S001.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ErrorCode::S002.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::S003.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ErrorCode::S004.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::S005.status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::S006.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::S007.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorCode::S008.status(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::S010.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_fatal_classification() {
        assert!(RouteError::from(ContextError::NotInitialized).is_fatal());
        assert!(RouteError::configuration("bad").is_fatal());
        assert!(!RouteError::internal("boom").is_fatal());
        assert!(!RouteError::validation(vec![]).is_fatal());
        assert!(!RouteError::http(ErrorCode::S004).is_fatal());
    }

    #[test]
    fn test_not_found_body() {
        let body = ErrorBody::from_code(ErrorCode::S002).to_value();
        assert_eq!(
            body,
            json!({
                "code": "S002",
                "type": "NOT_FOUND",
                "message": "The requested endpoint does not exist"
            })
        );
    }

    #[test]
    fn test_validation_body_lists_fields() {
        let error = RouteError::validation(vec![FieldError::new("params.id", "must be string")]);
        let body = ErrorBody::from_error(&error, false);
        assert_eq!(body.code, ErrorCode::S003);
        assert_eq!(body.error_type, ErrorType::ValidationError);
        assert_eq!(body.fields.as_deref().map(<[FieldError]>::len), Some(1));
        assert!(body.stack.is_none());
    }

    #[test]
    fn test_internal_error_does_not_leak() {
        let error = RouteError::internal_with_source(
            "database exploded",
            anyhow::anyhow!("connection refused"),
        );
        let body = ErrorBody::from_error(&error, false);
        assert_eq!(body.message, ErrorCode::S001.message());
        assert!(body.stack.is_none());

        let debug = ErrorBody::from_error(&error, true);
        let stack = debug.stack.unwrap();
        assert!(stack.contains("database exploded"));
        assert!(stack.contains("connection refused"));
    }

    #[test]
    fn test_http_error_keeps_custom_message() {
        let error = RouteError::http_with_message(ErrorCode::S004, "token expired");
        let body = ErrorBody::from_error(&error, false);
        assert_eq!(body.message, "token expired");
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
    }
}
