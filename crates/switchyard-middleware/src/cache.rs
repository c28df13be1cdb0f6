//! Memoization of generated middleware.
//!
//! Generated hooks are keyed by `(middleware name, key)`, where the key is
//! either supplied by the generator or derived with [`canonical_key`]. Each
//! key owns a [`OnceCell`], so a generator runs at most once per key even when
//! routes are compiled concurrently; the outcome, including an explicit
//! "skip" (`None`), is shared by every route with that key.

use crate::descriptor::{MiddlewareDescriptor, MiddlewareSource};
use crate::hook::RouteHook;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use switchyard_core::route::RouteMetadata;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Errors raised while resolving middleware.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The route metadata could not be serialized into a key.
    #[error("cannot derive cache key for middleware '{middleware}': {source}")]
    KeyDerivation {
        /// Middleware name.
        middleware: String,
        /// Serialization failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Deterministic, field-order independent serialization of `value`.
///
/// Object keys are sorted recursively and the output is compact JSON, so
/// two values with the same logical content always produce the same string
/// and values that differ anywhere produce different strings.
pub fn canonical_key<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    let mut out = String::new();
    write_canonical(&value, &mut out);
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (index, (key, item)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    middleware: String,
    key: String,
}

/// Process-wide cache of generated middleware hooks.
#[derive(Debug, Default)]
pub struct MiddlewareCache {
    entries: DashMap<CacheKey, Arc<OnceCell<Option<RouteHook>>>>,
    generations: AtomicUsize,
}

impl MiddlewareCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many times a generator has actually been invoked.
    #[must_use]
    pub fn generations(&self) -> usize {
        self.generations.load(Ordering::Relaxed)
    }

    /// Resolves the hook `descriptor` contributes to a route with `metadata`.
    ///
    /// Static middleware resolves to its hook directly. Generator middleware
    /// is looked up by key and generated on the first miss.
    pub async fn resolve(
        &self,
        descriptor: &MiddlewareDescriptor,
        metadata: &RouteMetadata,
    ) -> Result<Option<RouteHook>, CacheError> {
        let generator = match descriptor.source() {
            MiddlewareSource::Static(hook) => return Ok(Some(hook.clone())),
            MiddlewareSource::Generator(generator) => generator,
        };

        let key = match generator.cache_key(metadata) {
            Some(key) => key,
            None => canonical_key(metadata).map_err(|source| CacheError::KeyDerivation {
                middleware: descriptor.name().to_string(),
                source,
            })?,
        };

        let cell = {
            let entry = self
                .entries
                .entry(CacheKey {
                    middleware: descriptor.name().to_string(),
                    key,
                })
                .or_insert_with(|| Arc::new(OnceCell::new()));
            Arc::clone(&*entry)
        };

        let hook = cell
            .get_or_init(|| async {
                self.generations.fetch_add(1, Ordering::Relaxed);
                switchyard_telemetry::record_generation(descriptor.name());
                tracing::debug!(middleware = descriptor.name(), "generating middleware");
                generator.generate(metadata).await
            })
            .await;
        Ok(hook.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::MiddlewareGenerator;
    use crate::hook::{FnHook, HookKind};
    use indexmap::IndexMap;
    use proptest::prelude::*;
    use serde_json::json;
    use switchyard_core::route::HttpMethod;
    use switchyard_core::BoxFuture;

    struct RoleGate {
        keyed_by_roles: bool,
    }

    impl MiddlewareGenerator for RoleGate {
        fn cache_key(&self, metadata: &RouteMetadata) -> Option<String> {
            self.keyed_by_roles
                .then(|| metadata.extra("roles").map(ToString::to_string).unwrap_or_default())
        }

        fn generate<'a>(&'a self, metadata: &'a RouteMetadata) -> BoxFuture<'a, Option<RouteHook>> {
            Box::pin(async move {
                metadata
                    .extra("roles")
                    .map(|_| RouteHook::request(FnHook::new(|_, _| Ok(()))))
            })
        }
    }

    fn route(path: &str, roles: Option<Value>) -> RouteMetadata {
        let mut metadata = RouteMetadata::new(HttpMethod::Get, path);
        if let Some(roles) = roles {
            metadata.extra.insert("roles".into(), roles);
        }
        metadata
    }

    #[test]
    fn test_canonical_key_ignores_field_order() {
        let mut a = IndexMap::new();
        a.insert("b", json!(1));
        a.insert("a", json!({ "y": 2, "x": [3, { "k": "v", "j": null }] }));
        let mut b = IndexMap::new();
        b.insert("a", json!({ "x": [3, { "j": null, "k": "v" }], "y": 2 }));
        b.insert("b", json!(1));
        assert_eq!(canonical_key(&a).unwrap(), canonical_key(&b).unwrap());
        assert_eq!(
            canonical_key(&a).unwrap(),
            r#"{"a":{"x":[3,{"j":null,"k":"v"}],"y":2},"b":1}"#
        );
    }

    #[test]
    fn test_canonical_key_distinguishes_routes() {
        let a = canonical_key(&route("/a", None)).unwrap();
        let b = canonical_key(&route("/b", None)).unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_generator_runs_once_per_key() {
        let cache = MiddlewareCache::new();
        let descriptor = MiddlewareDescriptor::with_generator(
            "role-gate",
            HookKind::PreHandler,
            RoleGate { keyed_by_roles: true },
        );
        let mut hooks = Vec::new();
        for index in 0..10 {
            let metadata = route(&format!("/r{index}"), Some(json!(["admin"])));
            hooks.push(cache.resolve(&descriptor, &metadata).await.unwrap().unwrap());
        }
        assert_eq!(cache.generations(), 1);
        assert_eq!(cache.len(), 1);
        assert!(hooks.iter().all(|hook| hook.ptr_eq(&hooks[0])));
    }

    #[tokio::test]
    async fn test_skip_outcome_is_cached() {
        let cache = MiddlewareCache::new();
        let descriptor = MiddlewareDescriptor::with_generator(
            "role-gate",
            HookKind::PreHandler,
            RoleGate { keyed_by_roles: false },
        );
        let metadata = route("/public", None);
        assert!(cache.resolve(&descriptor, &metadata).await.unwrap().is_none());
        assert!(cache.resolve(&descriptor, &metadata).await.unwrap().is_none());
        assert_eq!(cache.generations(), 1);

        let other = route("/other", None);
        assert!(cache.resolve(&descriptor, &other).await.unwrap().is_none());
        assert_eq!(cache.generations(), 2);
    }

    #[tokio::test]
    async fn test_static_middleware_bypasses_cache() {
        let cache = MiddlewareCache::new();
        let hook = RouteHook::request(FnHook::new(|_, _| Ok(())));
        let descriptor =
            MiddlewareDescriptor::with_hook("static", HookKind::OnRequest, hook.clone());
        let resolved = cache.resolve(&descriptor, &route("/", None)).await.unwrap();
        assert!(resolved.unwrap().ptr_eq(&hook));
        assert!(cache.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolution_generates_once() {
        let cache = Arc::new(MiddlewareCache::new());
        let descriptor = Arc::new(MiddlewareDescriptor::with_generator(
            "role-gate",
            HookKind::PreHandler,
            RoleGate { keyed_by_roles: true },
        ));
        let mut tasks = Vec::new();
        for index in 0..16 {
            let cache = Arc::clone(&cache);
            let descriptor = Arc::clone(&descriptor);
            tasks.push(tokio::spawn(async move {
                let metadata = route(&format!("/c{index}"), Some(json!(["ops"])));
                cache.resolve(&descriptor, &metadata).await.unwrap().is_some()
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(cache.generations(), 1);
    }

    proptest! {
        #[test]
        fn test_canonical_key_is_order_independent(
            entries in proptest::collection::btree_map("[a-z]{1,6}", 0i64..1000, 0..8)
        ) {
            let forward: IndexMap<&String, &i64> = entries.iter().collect();
            let backward: IndexMap<&String, &i64> = entries.iter().rev().collect();
            prop_assert_eq!(canonical_key(&forward).unwrap(), canonical_key(&backward).unwrap());
        }
    }
}
