//! Compiled schema model and validator.
//!
//! [`Schema`] is the already-compiled output of whatever schema DSL the host
//! framework uses: a JSON-Schema shaped tree that serializes to and from the
//! familiar keywords (`type`, `properties`, `required`, `pattern`, ...). Field
//! annotations understood by the router (sensitivity and named transforms)
//! live under the `x-switchyard` keyword.
//!
//! Validation reports *all* errors, applies `default` values for missing
//! properties, and removes additional properties when an object schema sets
//! `additionalProperties: false`. Field paths are reported dotted, rooted at
//! the request part being validated (`params.id`, `body.items.0.name`).
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use switchyard_core::schema::{Pattern, Schema};
//!
//! let schema = Schema::object()
//!     .required_property("id", Schema::string().with_pattern(Pattern::new(r"^\d+$").unwrap()));
//!
//! let mut ok = json!({ "id": "42" });
//! assert!(schema.validate(&mut ok, "params").is_empty());
//!
//! let mut bad = json!({ "id": "abc" });
//! let errors = schema.validate(&mut bad, "params");
//! assert_eq!(errors[0].field, "params.id");
//! ```

use crate::error::FieldError;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::fmt;

/// JSON type keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    /// `"string"`
    String,
    /// `"integer"`
    Integer,
    /// `"number"`
    Number,
    /// `"boolean"`
    Boolean,
    /// `"array"`
    Array,
    /// `"object"`
    Object,
    /// `"null"`
    Null,
}

impl SchemaType {
    /// Returns the keyword spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Null => "null",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match (self, value) {
            (Self::String, Value::String(_))
            | (Self::Number, Value::Number(_))
            | (Self::Boolean, Value::Bool(_))
            | (Self::Array, Value::Array(_))
            | (Self::Object, Value::Object(_))
            | (Self::Null, Value::Null) => true,
            (Self::Integer, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        }
    }
}

/// A compiled `pattern` keyword.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    /// Compiles a pattern.
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Self)
    }

    /// Returns the source of the pattern.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Tests a string against the pattern.
    #[must_use]
    pub fn is_match(&self, input: &str) -> bool {
        self.0.is_match(input)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Self::new(&source).map_err(serde::de::Error::custom)
    }
}

/// How a sensitive value is masked in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensitiveKind {
    /// Replaced by a fixed placeholder.
    Secret,
    /// Email-shaped mask, keeps the first character and the domain.
    Email,
    /// Numeric mask, keeps the last four digits.
    Number,
    /// Word mask, keeps the first character of each word.
    Words,
}

/// The `sensitive` annotation: either a flag or an explicit mask kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sensitivity {
    /// `sensitive: true` masks with the secret placeholder.
    Flag(bool),
    /// `sensitive: "email"` and friends.
    Kind(SensitiveKind),
}

impl Sensitivity {
    /// Resolves the mask kind, if the field is sensitive at all.
    #[must_use]
    pub const fn kind(self) -> Option<SensitiveKind> {
        match self {
            Self::Flag(true) => Some(SensitiveKind::Secret),
            Self::Flag(false) => None,
            Self::Kind(kind) => Some(kind),
        }
    }
}

/// The `transform` annotation.
///
/// A bare name applies the transformer in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformSpec {
    /// Same transformer for input and output.
    Both(String),
    /// Separate transformers per direction.
    Split {
        /// Applied to request fields before validation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<String>,
        /// Applied to response fields before serialization.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
}

impl TransformSpec {
    /// Transformer name for request data.
    #[must_use]
    pub fn input(&self) -> Option<&str> {
        match self {
            Self::Both(name) => Some(name),
            Self::Split { input, .. } => input.as_deref(),
        }
    }

    /// Transformer name for response data.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Both(name) => Some(name),
            Self::Split { output, .. } => output.as_deref(),
        }
    }
}

/// Router-specific annotations attached to a schema node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAnnotations {
    /// Sensitivity for log masking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitive: Option<Sensitivity>,
    /// Named data transform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformSpec>,
}

/// A compiled schema node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Stable identity (`$id`), used as the compile-cache key when present.
    #[serde(rename = "$id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// JSON type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,
    /// Object properties, in declaration order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, Schema>,
    /// Required property names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    /// `false` strips undeclared properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<bool>,
    /// Array item schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    /// String pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    /// Minimum string length in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Maximum string length in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Inclusive numeric minimum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Inclusive numeric maximum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Allowed values.
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    /// Value used when the property is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Router annotations.
    #[serde(
        rename = "x-switchyard",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub annotations: Option<FieldAnnotations>,
}

impl Schema {
    fn typed(schema_type: SchemaType) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Self::default()
        }
    }

    /// A string schema.
    #[must_use]
    pub fn string() -> Self {
        Self::typed(SchemaType::String)
    }

    /// An integer schema.
    #[must_use]
    pub fn integer() -> Self {
        Self::typed(SchemaType::Integer)
    }

    /// A number schema.
    #[must_use]
    pub fn number() -> Self {
        Self::typed(SchemaType::Number)
    }

    /// A boolean schema.
    #[must_use]
    pub fn boolean() -> Self {
        Self::typed(SchemaType::Boolean)
    }

    /// An array schema.
    #[must_use]
    pub fn array(items: Schema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::typed(SchemaType::Array)
        }
    }

    /// An object schema with no properties yet.
    #[must_use]
    pub fn object() -> Self {
        Self::typed(SchemaType::Object)
    }

    /// Sets `$id`.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Adds an optional property.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Adds a required property.
    #[must_use]
    pub fn required_property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        let name = name.into();
        self.required.push(name.clone());
        self.properties.insert(name, schema);
        self
    }

    /// Sets `additionalProperties`.
    #[must_use]
    pub fn additional_properties(mut self, allowed: bool) -> Self {
        self.additional_properties = Some(allowed);
        self
    }

    /// Sets `pattern`.
    #[must_use]
    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Sets string length bounds.
    #[must_use]
    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    /// Sets numeric bounds.
    #[must_use]
    pub fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.minimum = min;
        self.maximum = max;
        self
    }

    /// Restricts the value to a fixed set.
    #[must_use]
    pub fn one_of(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.enum_values = Some(values.into_iter().collect());
        self
    }

    /// Sets `default`.
    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Marks the field sensitive.
    #[must_use]
    pub fn sensitive(mut self, kind: SensitiveKind) -> Self {
        self.annotations.get_or_insert_with(FieldAnnotations::default).sensitive =
            Some(Sensitivity::Kind(kind));
        self
    }

    /// Attaches a named transform.
    #[must_use]
    pub fn transform(mut self, spec: TransformSpec) -> Self {
        self.annotations.get_or_insert_with(FieldAnnotations::default).transform = Some(spec);
        self
    }

    /// Mask kind for this node, if it is sensitive.
    #[must_use]
    pub fn sensitivity(&self) -> Option<SensitiveKind> {
        self.annotations
            .as_ref()
            .and_then(|a| a.sensitive)
            .and_then(Sensitivity::kind)
    }

    /// Transform annotation for this node.
    #[must_use]
    pub fn transform_spec(&self) -> Option<&TransformSpec> {
        self.annotations.as_ref().and_then(|a| a.transform.as_ref())
    }

    /// Validates `value` in place without type coercion.
    ///
    /// Defaults are filled in and disallowed additional properties removed
    /// even when other errors are reported.
    pub fn validate(&self, value: &mut Value, root: &str) -> Vec<FieldError> {
        let mut walker = Walker::new(false);
        walker.check(self, value, root);
        walker.errors
    }

    /// Validates `value` in place, coercing scalar strings to the declared
    /// types first (`"42"` to `42`, `"true"` to `true`).
    pub fn validate_coerced(&self, value: &mut Value, root: &str) -> Vec<FieldError> {
        let mut walker = Walker::new(true);
        walker.check(self, value, root);
        walker.errors
    }

    /// Lenient, coercive validation for query strings.
    ///
    /// Each declared property is validated on its own. A property that fails
    /// is replaced by its `default`, or removed when it has none; nothing is
    /// ever reported as a hard failure. The returned list names the fields
    /// that were replaced or dropped.
    pub fn validate_lenient(&self, values: &mut Map<String, Value>, root: &str) -> Vec<FieldError> {
        let mut adjusted = Vec::new();
        fill_defaults(self, values);
        if self.additional_properties == Some(false) {
            values.retain(|key, _| self.properties.contains_key(key));
        }
        for (name, property) in &self.properties {
            let Some(current) = values.get(name) else {
                continue;
            };
            let mut candidate = current.clone();
            let mut walker = Walker::new(true);
            walker.check(property, &mut candidate, &join(root, name));
            if walker.errors.is_empty() {
                values.insert(name.clone(), candidate);
                continue;
            }
            match &property.default {
                Some(default) => {
                    values.insert(name.clone(), default.clone());
                }
                None => {
                    values.remove(name);
                }
            }
            adjusted.extend(walker.errors);
        }
        adjusted
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

fn fill_defaults(schema: &Schema, map: &mut Map<String, Value>) {
    for (name, property) in &schema.properties {
        if !map.contains_key(name) {
            if let Some(default) = &property.default {
                map.insert(name.clone(), default.clone());
            }
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

struct Walker {
    coerce: bool,
    errors: Vec<FieldError>,
}

impl Walker {
    const fn new(coerce: bool) -> Self {
        Self {
            coerce,
            errors: Vec::new(),
        }
    }

    fn push(&mut self, path: &str, msg: impl fmt::Display) {
        self.errors.push(FieldError::new(path, msg.to_string()));
    }

    fn check(&mut self, schema: &Schema, value: &mut Value, path: &str) {
        if let Some(expected) = schema.schema_type {
            if self.coerce {
                coerce(expected, value);
            }
            if !expected.matches(value) {
                self.push(path, format_args!("must be {}", expected.as_str()));
                return;
            }
        }

        if let Some(allowed) = &schema.enum_values {
            if !allowed.contains(value) {
                let listed: Vec<String> = allowed.iter().map(display_value).collect();
                self.push(
                    path,
                    format_args!(
                        "must be equal to one of the allowed values: {}",
                        listed.join(", ")
                    ),
                );
                return;
            }
        }

        match value {
            Value::String(s) => self.check_string(schema, s, path),
            Value::Number(n) => self.check_number(schema, n, path),
            Value::Object(map) => self.check_object(schema, map, path),
            Value::Array(items) => {
                if let Some(item_schema) = &schema.items {
                    for (index, item) in items.iter_mut().enumerate() {
                        self.check(item_schema, item, &join(path, &index.to_string()));
                    }
                }
            }
            Value::Bool(_) | Value::Null => {}
        }
    }

    fn check_string(&mut self, schema: &Schema, s: &str, path: &str) {
        let length = s.chars().count();
        if let Some(min) = schema.min_length {
            if length < min {
                self.push(path, format_args!("must NOT have fewer than {min} characters"));
            }
        }
        if let Some(max) = schema.max_length {
            if length > max {
                self.push(path, format_args!("must NOT have more than {max} characters"));
            }
        }
        if let Some(pattern) = &schema.pattern {
            if !pattern.is_match(s) {
                self.push(path, format_args!("must match pattern \"{}\"", pattern.as_str()));
            }
        }
    }

    fn check_number(&mut self, schema: &Schema, n: &Number, path: &str) {
        let Some(n) = n.as_f64() else { return };
        if let Some(min) = schema.minimum {
            if n < min {
                self.push(path, format_args!("must be >= {min}"));
            }
        }
        if let Some(max) = schema.maximum {
            if n > max {
                self.push(path, format_args!("must be <= {max}"));
            }
        }
    }

    fn check_object(&mut self, schema: &Schema, map: &mut Map<String, Value>, path: &str) {
        fill_defaults(schema, map);
        for name in &schema.required {
            if !map.contains_key(name) {
                self.push(
                    &join(path, name),
                    format_args!("must have required property '{name}'"),
                );
            }
        }
        if schema.additional_properties == Some(false) {
            map.retain(|key, _| schema.properties.contains_key(key));
        }
        for (name, property) in &schema.properties {
            if let Some(child) = map.get_mut(name) {
                self.check(property, child, &join(path, name));
            }
        }
    }
}

fn coerce(expected: SchemaType, value: &mut Value) {
    let coerced = match (expected, &*value) {
        (SchemaType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (SchemaType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
        (SchemaType::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
        (SchemaType::Number, Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>().map(Value::from).ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
            })
        }
        (SchemaType::Integer | SchemaType::Number, Value::Bool(b)) => Some(Value::from(u8::from(*b))),
        (SchemaType::Boolean, Value::String(s)) => match s.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        (SchemaType::Null, Value::String(s)) if s.is_empty() => Some(Value::Null),
        (SchemaType::Array, Value::Array(_)) => None,
        (SchemaType::Array, other) => Some(Value::Array(vec![other.clone()])),
        _ => None,
    };
    if let Some(coerced) = coerced {
        *value = coerced;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn digits() -> Pattern {
        Pattern::new(r"^\d+$").unwrap()
    }

    #[test]
    fn test_pattern_failure_names_field() {
        let schema = Schema::object().required_property("id", Schema::string().with_pattern(digits()));
        let mut value = json!({ "id": "abc" });
        let errors = schema.validate(&mut value, "params");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "params.id");
        assert!(errors[0].msg.contains("must match pattern"));
    }

    #[test]
    fn test_reports_all_errors() {
        let schema = Schema::object()
            .required_property("name", Schema::string())
            .required_property("age", Schema::integer().range(Some(0.0), None));
        let mut value = json!({ "age": -1 });
        let errors = schema.validate(&mut value, "body");
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["body.name", "body.age"]);
    }

    #[test]
    fn test_defaults_and_additional_properties() {
        let schema = Schema::object()
            .property("page", Schema::integer().with_default(json!(1)))
            .property("name", Schema::string())
            .additional_properties(false);
        let mut value = json!({ "name": "x", "extra": true });
        assert!(schema.validate(&mut value, "body").is_empty());
        assert_eq!(value, json!({ "name": "x", "page": 1 }));
    }

    #[test]
    fn test_enum_message_lists_allowed_values() {
        let schema = Schema::string().one_of([json!("asc"), json!("desc")]);
        let mut value = json!("up");
        let errors = schema.validate(&mut value, "query.sort");
        assert_eq!(
            errors[0].msg,
            "must be equal to one of the allowed values: asc, desc"
        );
    }

    #[test]
    fn test_nested_array_paths() {
        let schema = Schema::object().property(
            "items",
            Schema::array(Schema::object().required_property("name", Schema::string())),
        );
        let mut value = json!({ "items": [{ "name": "a" }, {}] });
        let errors = schema.validate(&mut value, "body");
        assert_eq!(errors[0].field, "body.items.1.name");
    }

    #[test]
    fn test_lenient_query_coerces_and_falls_back() {
        let schema = Schema::object()
            .property("limit", Schema::integer().with_default(json!(10)))
            .property("active", Schema::boolean())
            .property("x", Schema::integer());
        let mut query = Map::new();
        query.insert("limit".into(), json!("abc"));
        query.insert("active".into(), json!("maybe"));
        query.insert("x".into(), json!("1"));
        let adjusted = schema.validate_lenient(&mut query, "query");
        assert_eq!(query.get("limit"), Some(&json!(10)));
        assert!(!query.contains_key("active"));
        assert_eq!(query.get("x"), Some(&json!(1)));
        assert_eq!(adjusted.len(), 2);
    }

    #[test]
    fn test_annotations_roundtrip_from_json() {
        let schema: Schema = serde_json::from_value(json!({
            "type": "object",
            "properties": {
                "email": {
                    "type": "string",
                    "x-switchyard": { "sensitive": "email", "transform": "email:normalize" }
                },
                "password": { "type": "string", "x-switchyard": { "sensitive": true } },
                "count": {
                    "type": "string",
                    "x-switchyard": { "transform": { "input": "int:parse" } }
                }
            }
        }))
        .unwrap();
        let email = &schema.properties["email"];
        assert_eq!(email.sensitivity(), Some(SensitiveKind::Email));
        assert_eq!(email.transform_spec().and_then(TransformSpec::output), Some("email:normalize"));
        assert_eq!(schema.properties["password"].sensitivity(), Some(SensitiveKind::Secret));
        let count = schema.properties["count"].transform_spec().unwrap();
        assert_eq!(count.input(), Some("int:parse"));
        assert_eq!(count.output(), None);
    }

    #[test]
    fn test_invalid_pattern_rejected_on_load() {
        let result: Result<Schema, _> =
            serde_json::from_value(json!({ "type": "string", "pattern": "(" }));
        assert!(result.is_err());
    }

    fn query_schema() -> Schema {
        Schema::object()
            .property("page", Schema::integer().with_default(json!(1)))
            .property("ratio", Schema::number())
            .property("flag", Schema::boolean())
            .property("tag", Schema::string().length(Some(1), Some(8)))
    }

    proptest! {
        #[test]
        fn test_lenient_query_is_idempotent(
            page in "[0-9a-z]{0,4}",
            ratio in "[0-9.]{0,5}",
            flag in prop_oneof![Just("true".to_string()), Just("false".to_string()), "[a-z]{0,3}"],
            tag in "[a-z]{0,10}",
        ) {
            let schema = query_schema();
            let mut query = Map::new();
            query.insert("page".into(), Value::String(page));
            query.insert("ratio".into(), Value::String(ratio));
            query.insert("flag".into(), Value::String(flag));
            query.insert("tag".into(), Value::String(tag));

            schema.validate_lenient(&mut query, "query");
            let once = query.clone();
            let adjusted = schema.validate_lenient(&mut query, "query");
            prop_assert_eq!(once, query);
            prop_assert!(adjusted.is_empty());
        }
    }
}
