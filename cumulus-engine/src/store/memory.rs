//! In-memory object store.
//!
//! Holds objects in a map behind a `RwLock`, enforces optimistic concurrency
//! on `resource_version` and publishes change events like the replicated
//! store does. Used by tests and the standalone controller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::debug;

use crate::object::{ObjectKey, Resource};

use super::error::{Result, StoreError};
use super::event::Event;
use super::traits::ObjectStore;

const EVENT_CAPACITY: usize = 1024;

pub struct MemoryStore<R: Resource> {
    objects: RwLock<HashMap<ObjectKey, R>>,
    events: broadcast::Sender<Event>,
    writes: AtomicU64,
    fail_next: Mutex<Option<StoreError>>,
}

impl<R: Resource> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> MemoryStore<R> {
    pub fn new() -> Self {
        Self::with_event_capacity(EVENT_CAPACITY)
    }

    /// Store whose event channel buffers `capacity` events per subscriber.
    /// Slower subscribers see `RecvError::Lagged`.
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            objects: RwLock::new(HashMap::new()),
            events,
            writes: AtomicU64::new(0),
            fail_next: Mutex::new(None),
        }
    }

    /// Insert a new object. Assigns uid, generation 1 and resource version 1.
    pub async fn create(&self, mut obj: R) -> Result<R> {
        let key = obj.key();
        let mut objects = self.objects.write().await;
        if objects.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "{} {key} already exists",
                obj.kind()
            )));
        }

        let meta = obj.meta_mut();
        meta.uid = uuid::Uuid::new_v4().to_string();
        meta.generation = 1;
        meta.resource_version = 1;
        meta.deletion_timestamp = None;

        objects.insert(key.clone(), obj.clone());
        drop(objects);

        debug!(kind = obj.kind(), key = %key, "Object created");
        self.emit(Event::Created(key));
        Ok(obj)
    }

    /// Change the desired state of an object. Bumps the generation.
    pub async fn update_spec<F>(&self, key: &ObjectKey, update: F) -> Result<R>
    where
        F: FnOnce(&mut R),
    {
        let mut objects = self.objects.write().await;
        let obj = objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        update(obj);
        let meta = obj.meta_mut();
        meta.generation += 1;
        meta.resource_version += 1;
        let updated = obj.clone();
        drop(objects);

        self.emit(Event::Updated(key.clone()));
        Ok(updated)
    }

    /// Request deletion of an object.
    ///
    /// Without finalizers the object is removed immediately. Otherwise it is
    /// only marked for deletion and removed once the last finalizer is gone.
    pub async fn request_delete(&self, key: &ObjectKey) -> Result<()> {
        let mut objects = self.objects.write().await;
        let obj = objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        if obj.meta().finalizers.is_empty() {
            objects.remove(key);
            drop(objects);
            debug!(key = %key, "Object deleted");
            self.emit(Event::Deleted(key.clone()));
            return Ok(());
        }

        let meta = obj.meta_mut();
        if meta.deletion_timestamp.is_none() {
            meta.deletion_timestamp = Some(Utc::now());
            meta.resource_version += 1;
            drop(objects);
            debug!(key = %key, "Object marked for deletion");
            self.emit(Event::Updated(key.clone()));
        }
        Ok(())
    }

    pub async fn list(&self) -> Vec<R> {
        let objects = self.objects.read().await;
        let mut list: Vec<R> = objects.values().cloned().collect();
        list.sort_by_key(|o| o.key());
        list
    }

    pub async fn contains(&self, key: &ObjectKey) -> bool {
        self.objects.read().await.contains_key(key)
    }

    /// Number of write calls received through [`ObjectStore`].
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make the next write through [`ObjectStore`] fail with `err`.
    pub async fn fail_next_write(&self, err: StoreError) {
        *self.fail_next.lock().await = Some(err);
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Common prologue of every write: count it, apply injected faults and
    /// check the caller's revision.
    async fn begin_write(&self, stored: &R, obj: &R) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_next.lock().await.take() {
            return Err(err);
        }
        let expected = obj.meta().resource_version;
        let actual = stored.meta().resource_version;
        if expected != actual {
            return Err(StoreError::VersionMismatch { expected, actual });
        }
        Ok(())
    }
}

#[async_trait]
impl<R: Resource> ObjectStore<R> for MemoryStore<R> {
    async fn get(&self, key: &ObjectKey) -> Result<R> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn list_keys(&self) -> Result<Vec<ObjectKey>> {
        let mut keys: Vec<ObjectKey> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn patch_status(&self, obj: &mut R) -> Result<()> {
        let key = obj.key();
        let mut objects = self.objects.write().await;
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        self.begin_write(stored, obj).await?;

        *stored.status_mut() = obj.status().clone();
        stored.meta_mut().resource_version += 1;
        obj.meta_mut().resource_version = stored.meta().resource_version;
        drop(objects);

        self.emit(Event::Updated(key));
        Ok(())
    }

    async fn add_finalizer(&self, obj: &mut R, token: &str) -> Result<bool> {
        if obj.meta().has_finalizer(token) {
            return Ok(false);
        }

        let key = obj.key();
        let mut objects = self.objects.write().await;
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        self.begin_write(stored, obj).await?;

        let meta = stored.meta_mut();
        meta.finalizers.push(token.to_string());
        meta.resource_version += 1;
        *obj.meta_mut() = stored.meta().clone();
        drop(objects);

        self.emit(Event::Updated(key));
        Ok(true)
    }

    async fn remove_finalizer(&self, obj: &mut R, token: &str) -> Result<bool> {
        if !obj.meta().has_finalizer(token) {
            return Ok(false);
        }

        let key = obj.key();
        let mut objects = self.objects.write().await;
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        self.begin_write(stored, obj).await?;

        let meta = stored.meta_mut();
        meta.finalizers.retain(|f| f != token);
        meta.resource_version += 1;
        *obj.meta_mut() = stored.meta().clone();

        let remove = obj.meta().is_marked_for_deletion() && obj.meta().finalizers.is_empty();
        if remove {
            objects.remove(&key);
        }
        drop(objects);

        if remove {
            debug!(key = %key, "Last finalizer removed, object deleted");
            self.emit(Event::Deleted(key));
        } else {
            self.emit(Event::Updated(key));
        }
        Ok(true)
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}
