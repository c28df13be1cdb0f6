//! Middleware declarations.
//!
//! A middleware is either a *static* hook, attached as-is to every route, or
//! a *generator* that is asked once per distinct route metadata shape to
//! produce a hook (or decline with `None`). Generators let a middleware
//! specialise itself per route, e.g. an auth check that reads the route's
//! required roles from its metadata and skips public routes entirely.

use crate::hook::{HookKind, RouteHook};
use std::fmt;
use std::sync::Arc;
use switchyard_core::route::RouteMetadata;
use switchyard_core::BoxFuture;

/// Produces route-specific hooks from route metadata.
pub trait MiddlewareGenerator: Send + Sync {
    /// Derives the memoization key for `metadata`.
    ///
    /// Returning `None` (the default) keys the generated hook by a canonical
    /// serialization of the full metadata. Override it when only a small part
    /// of the metadata matters, so unrelated routes share one hook.
    fn cache_key(&self, metadata: &RouteMetadata) -> Option<String> {
        let _ = metadata;
        None
    }

    /// Builds the hook for a route, or `None` to skip the route.
    fn generate<'a>(&'a self, metadata: &'a RouteMetadata) -> BoxFuture<'a, Option<RouteHook>>;
}

/// How a middleware provides its hook.
#[derive(Clone)]
pub enum MiddlewareSource {
    /// The same hook for every route.
    Static(RouteHook),
    /// A hook generated per route metadata.
    Generator(Arc<dyn MiddlewareGenerator>),
}

impl fmt::Debug for MiddlewareSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(hook) => f.debug_tuple("Static").field(hook).finish(),
            Self::Generator(_) => f.write_str("Generator"),
        }
    }
}

/// A declared middleware.
#[derive(Debug, Clone)]
pub struct MiddlewareDescriptor {
    name: String,
    kind: HookKind,
    weight: i32,
    source: MiddlewareSource,
}

impl MiddlewareDescriptor {
    /// Declares a static middleware.
    pub fn with_hook(name: impl Into<String>, kind: HookKind, hook: RouteHook) -> Self {
        Self {
            name: name.into(),
            kind,
            weight: 0,
            source: MiddlewareSource::Static(hook),
        }
    }

    /// Declares a generator middleware.
    pub fn with_generator(
        name: impl Into<String>,
        kind: HookKind,
        generator: impl MiddlewareGenerator + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            weight: 0,
            source: MiddlewareSource::Generator(Arc::new(generator)),
        }
    }

    /// Sets the ordering weight. Higher weights run first.
    #[must_use]
    pub fn weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    /// Middleware name, used in logs and as part of the cache key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hook point.
    #[must_use]
    pub const fn kind(&self) -> HookKind {
        self.kind
    }

    /// Ordering weight.
    #[must_use]
    pub const fn ordering_weight(&self) -> i32 {
        self.weight
    }

    /// Hook source.
    #[must_use]
    pub const fn source(&self) -> &MiddlewareSource {
        &self.source
    }

    /// Whether the hook is generated per route.
    #[must_use]
    pub const fn is_generator(&self) -> bool {
        matches!(self.source, MiddlewareSource::Generator(_))
    }
}

/// Sorts middleware by descending weight, keeping declaration order among
/// equal weights.
pub fn sort_by_weight(middlewares: &mut [MiddlewareDescriptor]) {
    middlewares.sort_by(|a, b| b.weight.cmp(&a.weight));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::FnHook;

    fn noop(name: &str, weight: i32) -> MiddlewareDescriptor {
        MiddlewareDescriptor::with_hook(
            name,
            HookKind::PreHandler,
            RouteHook::request(FnHook::new(|_, _| Ok(()))),
        )
        .weight(weight)
    }

    #[test]
    fn test_sort_is_stable_and_descending() {
        let mut middlewares = vec![noop("a", 0), noop("b", 1), noop("c", 0)];
        sort_by_weight(&mut middlewares);
        let names: Vec<&str> = middlewares.iter().map(MiddlewareDescriptor::name).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_negative_weights_run_last() {
        let mut middlewares = vec![noop("late", -5), noop("default", 0), noop("early", 10)];
        sort_by_weight(&mut middlewares);
        let names: Vec<&str> = middlewares.iter().map(MiddlewareDescriptor::name).collect();
        assert_eq!(names, vec!["early", "default", "late"]);
    }
}
