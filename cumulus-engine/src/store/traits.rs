//! ObjectStore trait definition.
//!
//! Abstracts the datastore holding desired-state objects, so actions work
//! with typed objects instead of a wire protocol.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::object::{ObjectKey, Resource};

use super::error::Result;
use super::event::Event;

/// Store operations needed by the engine.
///
/// Writes take the object by `&mut` and update its metadata
/// (`resource_version`, `finalizers`) on success, so later steps of the same
/// invocation keep working on the current revision.
#[async_trait]
pub trait ObjectStore<R: Resource>: Send + Sync {
    /// Get an object by key. Absence is `StoreError::NotFound`.
    async fn get(&self, key: &ObjectKey) -> Result<R>;

    /// Keys of all stored objects, including those marked for deletion.
    async fn list_keys(&self) -> Result<Vec<ObjectKey>>;

    /// Replace the persisted status with `obj.status()`.
    ///
    /// Fails with `VersionMismatch` if the object changed since it was read.
    async fn patch_status(&self, obj: &mut R) -> Result<()>;

    /// Add a finalizer. Returns false without writing if already present.
    async fn add_finalizer(&self, obj: &mut R, token: &str) -> Result<bool>;

    /// Remove a finalizer. Returns false without writing if absent.
    ///
    /// Removing the last finalizer of an object marked for deletion lets the
    /// store physically remove it.
    async fn remove_finalizer(&self, obj: &mut R, token: &str) -> Result<bool>;

    /// Subscribe to change events.
    fn subscribe(&self) -> broadcast::Receiver<Event>;
}
