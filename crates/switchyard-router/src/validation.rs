//! Request validation stage.

use serde_json::{Map, Value};
use std::sync::Arc;
use switchyard_core::schema::Schema;
use switchyard_core::{FieldError, RouteError, RouteRequest};

/// Validates the parts of a request against the route's schemas.
///
/// - query: coercive and lenient, never fails
/// - params: strict, every failure is reported
/// - body: strict, skipped for child requests (they carry no body)
///
/// With silent validation the failures are attached to
/// [`RouteRequest::validation_error`] and the request continues.
#[derive(Debug, Clone, Default)]
pub struct RouteValidator {
    pub(crate) body: Option<Arc<Schema>>,
    pub(crate) params: Option<Arc<Schema>>,
    pub(crate) query: Option<Arc<Schema>>,
    pub(crate) silent: bool,
}

impl RouteValidator {
    /// Whether any schema is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_none() && self.params.is_none() && self.query.is_none()
    }

    /// Validates `request` in place.
    pub fn validate(&self, request: &mut RouteRequest, with_body: bool) -> Result<(), RouteError> {
        if let Some(schema) = &self.query {
            let adjusted = schema.validate_lenient(&mut request.query, "query");
            if !adjusted.is_empty() {
                tracing::debug!(
                    rid = %request.id,
                    fields = ?adjusted.iter().map(|e| e.field.as_str()).collect::<Vec<_>>(),
                    "query fields replaced by defaults or dropped"
                );
            }
        }

        let mut errors = Vec::new();
        if let Some(schema) = &self.params {
            errors.extend(validate_map(schema, &mut request.params, "params"));
        }
        if with_body {
            if let Some(schema) = &self.body {
                errors.extend(schema.validate(&mut request.body, "body"));
            }
        }

        if errors.is_empty() {
            return Ok(());
        }
        if self.silent {
            request.validation_error = Some(errors);
            return Ok(());
        }
        Err(RouteError::validation(errors))
    }
}

fn validate_map(schema: &Schema, map: &mut Map<String, Value>, root: &str) -> Vec<FieldError> {
    let mut value = Value::Object(std::mem::take(map));
    let errors = schema.validate(&mut value, root);
    if let Value::Object(validated) = value {
        *map = validated;
    }
    errors
}
