//! Compiles schema annotations into reusable transform plans.
//!
//! A [`CompiledTransform`] is a pruned copy of the schema tree that only keeps
//! the branches leading to annotated fields. Walking it touches nothing else,
//! so applying a transform to a large payload with a single annotated field
//! costs a handful of map lookups.
//!
//! Plans are cached per schema identity and [`TransformKind`]. A schema's
//! `$id` is its identity when present; otherwise the address of the shared
//! `Arc<Schema>` is, and the cache keeps that `Arc` alive so the address
//! cannot be reused.

use crate::mask::mask_value;
use crate::registry::{Transformer, TransformerRegistry};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use switchyard_core::error::{FieldError, RouteError};
use switchyard_core::schema::{Schema, SensitiveKind, TransformSpec};
use thiserror::Error;

/// Errors raised while compiling or applying transforms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// A schema references a transformer that is not registered.
    #[error("unknown transformer '{name}'")]
    UnknownTransformer {
        /// The referenced name.
        name: String,
    },

    /// A transformer rejected a field value.
    #[error("transformer '{name}' rejected {field}: {reason}")]
    InvalidValue {
        /// Transformer name.
        name: String,
        /// Dotted field path.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl From<TransformError> for RouteError {
    fn from(error: TransformError) -> Self {
        match error {
            TransformError::UnknownTransformer { name } => {
                Self::configuration(format!("unknown transformer '{name}'"))
            }
            TransformError::InvalidValue { field, reason, .. } => {
                Self::validation(vec![FieldError::new(field, reason)])
            }
        }
    }
}

/// Which annotations a compiled transform acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    /// `sensitive` fields, masked for logging.
    Mask,
    /// `transform.input` fields, applied to request data.
    Input,
    /// `transform.output` fields, applied to response data.
    Output,
}

enum Action {
    Mask(SensitiveKind),
    Apply { name: String, transformer: Transformer },
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mask(kind) => f.debug_tuple("Mask").field(kind).finish(),
            Self::Apply { name, .. } => f.debug_tuple("Apply").field(name).finish(),
        }
    }
}

#[derive(Debug)]
enum Plan {
    Leaf(Action),
    Object(Vec<(String, Plan)>),
    Array(Box<Plan>),
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

impl Plan {
    fn run(&self, value: &mut Value, path: &str) -> Result<(), TransformError> {
        match (self, value) {
            (Self::Leaf(action), value) => action.run(value, path),
            (Self::Object(fields), Value::Object(map)) => {
                for (name, plan) in fields {
                    if let Some(child) = map.get_mut(name) {
                        plan.run(child, &join(path, name))?;
                    }
                }
                Ok(())
            }
            (Self::Array(plan), Value::Array(items)) => {
                for (index, item) in items.iter_mut().enumerate() {
                    plan.run(item, &join(path, &index.to_string()))?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl Action {
    fn run(&self, value: &mut Value, path: &str) -> Result<(), TransformError> {
        match self {
            Self::Mask(kind) => {
                *value = mask_value(*kind, value);
                Ok(())
            }
            Self::Apply { name, transformer } => match value {
                Value::Null => Ok(()),
                Value::Array(items) => {
                    for (index, item) in items.iter_mut().enumerate() {
                        apply_one(name, transformer, item, &join(path, &index.to_string()))?;
                    }
                    Ok(())
                }
                other => apply_one(name, transformer, other, path),
            },
        }
    }
}

fn apply_one(
    name: &str,
    transformer: &Transformer,
    value: &mut Value,
    path: &str,
) -> Result<(), TransformError> {
    *value = transformer(&*value).map_err(|reason| TransformError::InvalidValue {
        name: name.to_string(),
        field: path.to_string(),
        reason,
    })?;
    Ok(())
}

/// A compiled transform for one schema and one [`TransformKind`].
#[derive(Debug)]
pub struct CompiledTransform {
    kind: TransformKind,
    plan: Option<Plan>,
}

impl CompiledTransform {
    /// The annotation kind this transform acts on.
    #[must_use]
    pub const fn kind(&self) -> TransformKind {
        self.kind
    }

    /// Whether the schema had no qualifying fields.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.plan.is_none()
    }

    /// Applies the transform in place. Field paths in errors are rooted at
    /// `root` (`"body"`, `"query"`, ...).
    pub fn apply(&self, value: &mut Value, root: &str) -> Result<(), TransformError> {
        match &self.plan {
            Some(plan) => plan.run(value, root),
            None => Ok(()),
        }
    }

    /// Returns a masked copy of `value`, leaving `value` untouched.
    #[must_use]
    pub fn masked(&self, value: &Value) -> Value {
        let mut copy = value.clone();
        if let Err(error) = self.apply(&mut copy, "") {
            tracing::warn!(%error, "masking failed, dropping value from log");
            return Value::Null;
        }
        copy
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SchemaIdentity {
    Id(String),
    Address(usize),
}

impl SchemaIdentity {
    fn of(schema: &Arc<Schema>) -> Self {
        match &schema.id {
            Some(id) => Self::Id(id.clone()),
            None => Self::Address(Arc::as_ptr(schema) as usize),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    _schema: Arc<Schema>,
    transform: Arc<CompiledTransform>,
}

/// Compiles and caches transforms.
#[derive(Debug)]
pub struct TransformCompiler {
    registry: TransformerRegistry,
    cache: DashMap<(SchemaIdentity, TransformKind), CacheEntry>,
    compilations: AtomicUsize,
}

impl Default for TransformCompiler {
    fn default() -> Self {
        Self::new(TransformerRegistry::new())
    }
}

impl TransformCompiler {
    /// Creates a compiler resolving names against `registry`.
    #[must_use]
    pub fn new(registry: TransformerRegistry) -> Self {
        Self {
            registry,
            cache: DashMap::new(),
            compilations: AtomicUsize::new(0),
        }
    }

    /// The transformer registry.
    #[must_use]
    pub const fn registry(&self) -> &TransformerRegistry {
        &self.registry
    }

    /// Number of schemas compiled so far (cache misses).
    #[must_use]
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    /// Compiles `schema` for `kind`, reusing a cached plan when the same
    /// schema was compiled before.
    ///
    /// Unknown transformer names fail here, at registration time, rather
    /// than on a request.
    pub fn compile(
        &self,
        schema: &Arc<Schema>,
        kind: TransformKind,
    ) -> Result<Arc<CompiledTransform>, TransformError> {
        match self.cache.entry((SchemaIdentity::of(schema), kind)) {
            Entry::Occupied(entry) => Ok(Arc::clone(&entry.get().transform)),
            Entry::Vacant(entry) => {
                let transform = Arc::new(CompiledTransform {
                    kind,
                    plan: self.plan(schema, kind)?,
                });
                self.compilations.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    schema = schema.id.as_deref().unwrap_or("<anonymous>"),
                    ?kind,
                    noop = transform.is_noop(),
                    "compiled schema transform"
                );
                entry.insert(CacheEntry {
                    _schema: Arc::clone(schema),
                    transform: Arc::clone(&transform),
                });
                Ok(transform)
            }
        }
    }

    fn resolve(&self, name: &str) -> Result<Action, TransformError> {
        self.registry
            .get(name)
            .map(|transformer| Action::Apply {
                name: name.to_string(),
                transformer,
            })
            .ok_or_else(|| TransformError::UnknownTransformer {
                name: name.to_string(),
            })
    }

    fn action(&self, node: &Schema, kind: TransformKind) -> Result<Option<Action>, TransformError> {
        let name = match kind {
            TransformKind::Mask => return Ok(node.sensitivity().map(Action::Mask)),
            TransformKind::Input => node.transform_spec().and_then(TransformSpec::input),
            TransformKind::Output => node.transform_spec().and_then(TransformSpec::output),
        };
        name.map(|name| self.resolve(name)).transpose()
    }

    fn plan(&self, node: &Schema, kind: TransformKind) -> Result<Option<Plan>, TransformError> {
        if let Some(action) = self.action(node, kind)? {
            return Ok(Some(Plan::Leaf(action)));
        }
        let mut fields = Vec::new();
        for (name, child) in &node.properties {
            if let Some(plan) = self.plan(child, kind)? {
                fields.push((name.clone(), plan));
            }
        }
        if !fields.is_empty() {
            return Ok(Some(Plan::Object(fields)));
        }
        match &node.items {
            Some(items) => Ok(self.plan(items, kind)?.map(|plan| Plan::Array(Box::new(plan)))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_schema() -> Arc<Schema> {
        Arc::new(
            Schema::object()
                .property(
                    "email",
                    Schema::string()
                        .sensitive(SensitiveKind::Email)
                        .transform(TransformSpec::Both("email:normalize".into())),
                )
                .property("name", Schema::string())
                .property(
                    "tags",
                    Schema::array(Schema::string().transform(TransformSpec::Both("string:trim".into()))),
                )
                .property(
                    "age",
                    Schema::string().transform(TransformSpec::Split {
                        input: Some("int:parse".into()),
                        output: None,
                    }),
                ),
        )
    }

    #[test]
    fn test_input_transform_applies_in_place() {
        let compiler = TransformCompiler::default();
        let transform = compiler.compile(&user_schema(), TransformKind::Input).unwrap();
        let mut value = json!({
            "email": " Ada@X.io ",
            "name": " keep ",
            "tags": [" a ", "b "],
            "age": "42 years"
        });
        transform.apply(&mut value, "body").unwrap();
        assert_eq!(
            value,
            json!({ "email": "ada@x.io", "name": " keep ", "tags": ["a", "b"], "age": 42 })
        );
    }

    #[test]
    fn test_output_transform_skips_input_only_fields() {
        let compiler = TransformCompiler::default();
        let transform = compiler.compile(&user_schema(), TransformKind::Output).unwrap();
        let mut value = json!({ "email": "ADA@X.IO", "age": "42 years" });
        transform.apply(&mut value, "").unwrap();
        assert_eq!(value, json!({ "email": "ada@x.io", "age": "42 years" }));
    }

    #[test]
    fn test_masked_copy_leaves_original_untouched() {
        let compiler = TransformCompiler::default();
        let mask = compiler.compile(&user_schema(), TransformKind::Mask).unwrap();
        let original = json!({ "email": "a@b.com", "name": "Ada" });
        let masked = mask.masked(&original);
        assert_eq!(masked, json!({ "email": "a****@b.com", "name": "Ada" }));
        assert_eq!(original["email"], json!("a@b.com"));
        assert_ne!(masked, original);
    }

    #[test]
    fn test_compiles_once_per_schema_identity() {
        let compiler = TransformCompiler::default();
        let schema = user_schema();
        let first = compiler.compile(&schema, TransformKind::Input).unwrap();
        let second = compiler.compile(&schema, TransformKind::Input).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(compiler.compilations(), 1);

        compiler.compile(&schema, TransformKind::Mask).unwrap();
        assert_eq!(compiler.compilations(), 2);
    }

    #[test]
    fn test_schema_id_shares_cache_entry() {
        let compiler = TransformCompiler::default();
        let a = Arc::new(Schema::object().with_id("User"));
        let b = Arc::new(Schema::object().with_id("User"));
        compiler.compile(&a, TransformKind::Output).unwrap();
        compiler.compile(&b, TransformKind::Output).unwrap();
        assert_eq!(compiler.compilations(), 1);
    }

    #[test]
    fn test_unknown_transformer_is_configuration_error() {
        let compiler = TransformCompiler::default();
        let schema = Arc::new(
            Schema::object().property("x", Schema::string().transform(TransformSpec::Both("nope".into()))),
        );
        let error = compiler.compile(&schema, TransformKind::Input).unwrap_err();
        assert_eq!(error, TransformError::UnknownTransformer { name: "nope".into() });
        assert!(RouteError::from(error).is_fatal());
    }

    #[test]
    fn test_invalid_value_becomes_validation_error() {
        let compiler = TransformCompiler::default();
        let schema = Arc::new(
            Schema::object().property("id", Schema::string().transform(TransformSpec::Both("bigint:parse".into()))),
        );
        let transform = compiler.compile(&schema, TransformKind::Input).unwrap();
        let mut value = json!({ "id": "12.5" });
        let error = RouteError::from(transform.apply(&mut value, "body").unwrap_err());
        assert_eq!(error.fields().unwrap()[0].field, "body.id");
    }

    proptest::proptest! {
        #[test]
        fn test_mask_never_mutates_payload(local in "[a-z]{1,12}", domain in "[a-z]{1,8}\\.com") {
            let compiler = TransformCompiler::default();
            let mask = compiler.compile(&user_schema(), TransformKind::Mask).unwrap();
            let original = json!({ "email": format!("{local}@{domain}") });
            let snapshot = original.clone();
            let masked = mask.masked(&original);
            proptest::prop_assert_eq!(&original, &snapshot);
            proptest::prop_assert_ne!(&masked, &original);
        }
    }

    #[test]
    fn test_unannotated_schema_is_noop() {
        let compiler = TransformCompiler::default();
        let schema = Arc::new(Schema::object().property("a", Schema::string()));
        assert!(compiler.compile(&schema, TransformKind::Mask).unwrap().is_noop());
    }
}
