//! Ambient object-store selection.
//!
//! The active store is carried in a task-local scope so that a logical
//! operation issuing several fetches (compare, flat-tree walk, commit
//! listing) shares one cache without the caller plumbing it through every
//! signature. When no store is installed, each operation creates an
//! ephemeral memory store that is dropped when the call returns.

use std::sync::Arc;

use super::{MemoryStore, ObjectStore};

tokio::task_local! {
    static ACTIVE_STORE: Arc<dyn ObjectStore>;
}

/// Run `fut` with `store` installed as the ambient object store for every
/// operation awaited inside it.
pub async fn with_object_store<F>(store: Arc<dyn ObjectStore>, fut: F) -> F::Output
where
    F: std::future::Future,
{
    ACTIVE_STORE.scope(store, fut).await
}

/// The store installed in the current task scope, if any.
pub fn active_object_store() -> Option<Arc<dyn ObjectStore>> {
    ACTIVE_STORE.try_with(|store| store.clone()).ok()
}

/// The ambient store, or a fresh call-scoped memory store.
pub fn store_or_ephemeral() -> Arc<dyn ObjectStore> {
    active_object_store().unwrap_or_else(|| Arc::new(MemoryStore::new()))
}
