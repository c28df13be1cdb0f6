//! Request-scoped context store.
//!
//! Every request runs inside a scope that owns a [`ContextStore`]: the
//! request head, the reply, a request id (RID) and arbitrary key/value pairs
//! set by middleware and handlers. The active store travels with the task via
//! a tokio task-local, so concurrent requests never observe each other's
//! values and nothing is shared through a global map.
//!
//! A request may open *child* scopes for in-process sub-requests. A child
//! store points at its parent, gets the RID `"{parent}-{n}"` from a counter
//! kept on the parent, and can read through to the parent with
//! [`Context::get_from_parent`] or [`Context::resolve`]. Children cannot open
//! further children.
//!
//! Task-locals do not cross `tokio::spawn`; work spawned from a handler runs
//! outside the request scope unless it is wrapped in [`Context::scope`] again.
//!
//! # Example
//!
//! ```
//! use http::Method;
//! use switchyard_core::context::{Context, ContextStore};
//! use switchyard_core::request::{Reply, RequestHead};
//!
//! # tokio_test::block_on(async {
//! let store = ContextStore::root("req-1", RequestHead::new(Method::GET, "/".parse().unwrap()), Reply::new());
//! let ctx = Context::new();
//! Context::scope(store, async {
//!     ctx.set("user", String::from("ada")).unwrap();
//!     assert_eq!(ctx.get::<String>("user").unwrap().as_deref(), Some("ada"));
//!     assert_eq!(ctx.rid().unwrap(), "req-1");
//! })
//! .await;
//! # });
//! ```

use crate::error::ContextError;
use crate::request::{Reply, RequestHead};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Context key that suppresses the request log line when set to `true`.
pub const DISABLE_REQUEST_LOGGING: &str = "DISABLE_REQUEST_LOGGING";

type ContextValue = Arc<dyn Any + Send + Sync>;

tokio::task_local! {
    static ACTIVE_STORE: Arc<ContextStore>;
}

/// Storage for one request or child request.
pub struct ContextStore {
    rid: String,
    request: RequestHead,
    reply: Reply,
    parent: Option<Arc<ContextStore>>,
    child_counter: AtomicU32,
    values: RwLock<HashMap<String, ContextValue>>,
}

impl std::fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStore")
            .field("rid", &self.rid)
            .field("is_child", &self.parent.is_some())
            .field("keys", &self.values.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ContextStore {
    /// Creates the store for a top-level request.
    #[must_use]
    pub fn root(rid: impl Into<String>, request: RequestHead, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            rid: rid.into(),
            request,
            reply,
            parent: None,
            child_counter: AtomicU32::new(0),
            values: RwLock::new(HashMap::new()),
        })
    }

    /// Request id of this store.
    #[must_use]
    pub fn rid(&self) -> &str {
        &self.rid
    }

    /// Whether this store belongs to a child request.
    #[must_use]
    pub fn is_child(&self) -> bool {
        self.parent.is_some()
    }

    fn read<T>(&self, key: &str) -> Result<Option<T>, ContextError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let values = self.values.read();
        match values.get(key) {
            None => Ok(None),
            Some(value) => value
                .downcast_ref::<T>()
                .cloned()
                .map(Some)
                .ok_or_else(|| ContextError::TypeMismatch { key: key.to_string() }),
        }
    }

    fn write(&self, key: String, value: ContextValue) {
        self.values.write().insert(key, value);
    }
}

/// Handle to the active context.
///
/// `Context` carries no state of its own; every call reads the store bound to
/// the current task. Operations outside a scope fail with
/// [`ContextError::NotInitialized`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Context;

impl Context {
    /// Creates a handle.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Runs `future` with `store` as the active context.
    pub async fn scope<F>(store: Arc<ContextStore>, future: F) -> F::Output
    where
        F: Future,
    {
        ACTIVE_STORE.scope(store, future).await
    }

    /// Whether a context is active for the current task.
    #[must_use]
    pub fn is_active() -> bool {
        ACTIVE_STORE.try_with(|_| ()).is_ok()
    }

    fn current() -> Result<Arc<ContextStore>, ContextError> {
        ACTIVE_STORE
            .try_with(Arc::clone)
            .map_err(|_| ContextError::NotInitialized)
    }

    /// Creates a child store linked to the active one.
    ///
    /// Fails when no context is active, or when the active context is
    /// already a child.
    pub fn begin_child(
        &self,
        request: RequestHead,
        reply: Reply,
    ) -> Result<Arc<ContextStore>, ContextError> {
        let parent = Self::current()?;
        if parent.is_child() {
            return Err(ContextError::NestedChild);
        }
        let counter = parent.child_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let rid = format!("{}-{counter}", parent.rid);
        tracing::debug!(parent = %parent.rid, rid = %rid, "opening child context");
        Ok(Arc::new(ContextStore {
            rid,
            request,
            reply,
            parent: Some(parent),
            child_counter: AtomicU32::new(0),
            values: RwLock::new(HashMap::new()),
        }))
    }

    /// Runs `future` inside a new child scope of the active context.
    pub async fn scope_child<F>(
        &self,
        request: RequestHead,
        reply: Reply,
        future: F,
    ) -> Result<F::Output, ContextError>
    where
        F: Future,
    {
        let child = self.begin_child(request, reply)?;
        Ok(Self::scope(child, future).await)
    }

    /// Reads a value from the active store.
    pub fn get<T>(&self, key: &str) -> Result<Option<T>, ContextError>
    where
        T: Clone + Send + Sync + 'static,
    {
        Self::current()?.read(key)
    }

    /// Reads a value from the active store, failing when it is absent.
    pub fn get_required<T>(&self, key: &str) -> Result<T, ContextError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.get(key)?
            .ok_or_else(|| ContextError::KeyNotFound { key: key.to_string() })
    }

    /// Stores a value in the active store.
    pub fn set<T>(&self, key: impl Into<String>, value: T) -> Result<(), ContextError>
    where
        T: Send + Sync + 'static,
    {
        Self::current()?.write(key.into(), Arc::new(value));
        Ok(())
    }

    /// Stores a value in the parent store, or the active store outside a
    /// child scope.
    pub fn set_in_parent<T>(&self, key: impl Into<String>, value: T) -> Result<(), ContextError>
    where
        T: Send + Sync + 'static,
    {
        let store = Self::current()?;
        let target = store.parent.as_ref().unwrap_or(&store);
        target.write(key.into(), Arc::new(value));
        Ok(())
    }

    /// Reads a value from the parent store.
    ///
    /// Outside a child scope this behaves like [`Context::get`].
    pub fn get_from_parent<T>(&self, key: &str) -> Result<Option<T>, ContextError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let store = Self::current()?;
        match &store.parent {
            Some(parent) => parent.read(key),
            None => store.read(key),
        }
    }

    /// Like [`Context::get_from_parent`], failing when the value is absent.
    pub fn get_from_parent_required<T>(&self, key: &str) -> Result<T, ContextError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let store = Self::current()?;
        match &store.parent {
            Some(parent) => parent
                .read(key)?
                .ok_or_else(|| ContextError::ParentKeyNotFound { key: key.to_string() }),
            None => store
                .read(key)?
                .ok_or_else(|| ContextError::KeyNotFound { key: key.to_string() }),
        }
    }

    /// Reads from the active store, falling back to the parent store when
    /// the active store is a child and does not hold the key.
    pub fn resolve<T>(&self, key: &str) -> Result<Option<T>, ContextError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let store = Self::current()?;
        if let Some(value) = store.read(key)? {
            return Ok(Some(value));
        }
        match &store.parent {
            Some(parent) => parent.read(key),
            None => Ok(None),
        }
    }

    /// Like [`Context::resolve`], failing when the value is absent everywhere.
    pub fn resolve_required<T>(&self, key: &str) -> Result<T, ContextError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.resolve(key)?
            .ok_or_else(|| ContextError::KeyNotFound { key: key.to_string() })
    }

    /// Whether the active store is a child.
    pub fn is_child(&self) -> Result<bool, ContextError> {
        Ok(Self::current()?.is_child())
    }

    /// Request id of the active store.
    pub fn rid(&self) -> Result<String, ContextError> {
        Ok(Self::current()?.rid.clone())
    }

    /// The originating request: the parent's request inside a child scope.
    pub fn request(&self) -> Result<RequestHead, ContextError> {
        let store = Self::current()?;
        let owner = store.parent.as_ref().unwrap_or(&store);
        Ok(owner.request.clone())
    }

    /// The synthetic request of the active child scope, if any.
    pub fn child_request(&self) -> Result<Option<RequestHead>, ContextError> {
        let store = Self::current()?;
        Ok(store.is_child().then(|| store.request.clone()))
    }

    /// The reply of the active store (the capture sink inside a child scope).
    pub fn reply(&self) -> Result<Reply, ContextError> {
        Ok(Self::current()?.reply.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn root(rid: &str) -> Arc<ContextStore> {
        ContextStore::root(
            rid,
            RequestHead::new(Method::GET, "/parent".parse().unwrap()),
            Reply::new(),
        )
    }

    fn child_head() -> RequestHead {
        RequestHead::new(Method::GET, "/child".parse().unwrap())
    }

    #[test]
    fn test_operations_outside_scope_fail() {
        let ctx = Context::new();
        assert!(!Context::is_active());
        assert_eq!(ctx.set("k", 1_u32), Err(ContextError::NotInitialized));
        assert_eq!(ctx.get::<u32>("k"), Err(ContextError::NotInitialized));
        assert_eq!(ctx.rid(), Err(ContextError::NotInitialized));
        assert_eq!(
            ctx.begin_child(child_head(), Reply::new()).err(),
            Some(ContextError::NotInitialized)
        );
    }

    #[tokio::test]
    async fn test_get_set_and_required() {
        let ctx = Context::new();
        Context::scope(root("r1"), async {
            assert!(Context::is_active());
            ctx.set("count", 3_u32).unwrap();
            assert_eq!(ctx.get::<u32>("count").unwrap(), Some(3));
            assert_eq!(ctx.get::<u32>("missing").unwrap(), None);
            assert_eq!(
                ctx.get_required::<u32>("missing"),
                Err(ContextError::KeyNotFound { key: "missing".into() })
            );
            assert_eq!(
                ctx.get::<String>("count"),
                Err(ContextError::TypeMismatch { key: "count".into() })
            );
        })
        .await;
    }

    #[tokio::test]
    async fn test_child_rids_increment_on_parent() {
        let ctx = Context::new();
        Context::scope(root("abc"), async {
            let first = ctx
                .scope_child(child_head(), Reply::new(), async { ctx.rid().unwrap() })
                .await
                .unwrap();
            let second = ctx
                .scope_child(child_head(), Reply::new(), async { ctx.rid().unwrap() })
                .await
                .unwrap();
            assert_eq!(first, "abc-1");
            assert_eq!(second, "abc-2");
            assert_eq!(ctx.rid().unwrap(), "abc");
        })
        .await;
    }

    #[tokio::test]
    async fn test_nested_child_is_rejected() {
        let ctx = Context::new();
        Context::scope(root("r"), async {
            let nested = ctx
                .scope_child(child_head(), Reply::new(), async {
                    ctx.scope_child(child_head(), Reply::new(), async {}).await
                })
                .await
                .unwrap();
            assert_eq!(nested, Err(ContextError::NestedChild));
        })
        .await;
    }

    #[tokio::test]
    async fn test_parent_reads_and_resolve() {
        let ctx = Context::new();
        Context::scope(root("r"), async {
            ctx.set("tenant", "acme".to_string()).unwrap();
            ctx.scope_child(child_head(), Reply::new(), async {
                assert!(ctx.is_child().unwrap());
                assert_eq!(ctx.get::<String>("tenant").unwrap(), None);
                assert_eq!(
                    ctx.get_from_parent::<String>("tenant").unwrap().as_deref(),
                    Some("acme")
                );
                assert_eq!(ctx.resolve_required::<String>("tenant").unwrap(), "acme");
                assert_eq!(
                    ctx.get_from_parent_required::<String>("nope"),
                    Err(ContextError::ParentKeyNotFound { key: "nope".into() })
                );

                ctx.set("tenant", "child".to_string()).unwrap();
                assert_eq!(ctx.resolve::<String>("tenant").unwrap().as_deref(), Some("child"));

                ctx.set_in_parent("seen", true).unwrap();
                assert_eq!(ctx.request().unwrap().uri.path(), "/parent");
                assert_eq!(ctx.child_request().unwrap().unwrap().uri.path(), "/child");
            })
            .await
            .unwrap();

            assert_eq!(ctx.get::<bool>("seen").unwrap(), Some(true));
            assert_eq!(ctx.get::<String>("tenant").unwrap().as_deref(), Some("acme"));
            assert!(ctx.child_request().unwrap().is_none());
        })
        .await;
    }

    #[tokio::test]
    async fn test_get_from_parent_outside_child_reads_active_store() {
        let ctx = Context::new();
        Context::scope(root("r"), async {
            ctx.set("k", 7_i64).unwrap();
            assert_eq!(ctx.get_from_parent::<i64>("k").unwrap(), Some(7));
            assert!(!ctx.is_child().unwrap());
        })
        .await;
    }

    #[tokio::test]
    async fn test_concurrent_scopes_are_isolated() {
        let ctx = Context::new();
        let a = Context::scope(root("a"), async move {
            ctx.set("who", "a".to_string()).unwrap();
            tokio::task::yield_now().await;
            ctx.get::<String>("who").unwrap()
        });
        let b = Context::scope(root("b"), async move {
            ctx.set("who", "b".to_string()).unwrap();
            tokio::task::yield_now().await;
            ctx.get::<String>("who").unwrap()
        });
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.as_deref(), Some("a"));
        assert_eq!(b.as_deref(), Some("b"));
    }
}
