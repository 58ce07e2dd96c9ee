//! Per-invocation execution state.

use std::sync::Arc;

use crate::config::BackoffPolicy;
use crate::object::{ObjectKey, Resource};
use crate::store::ObjectStore;

/// Capabilities every reconciled state offers to generic actions.
///
/// Status, finalizer and error-handling steps are written against this
/// trait, so they work with any workflow state that exposes the object
/// being reconciled and its store.
pub trait ObjectState: Send + 'static {
    type Resource: Resource;

    fn obj(&self) -> &Self::Resource;
    fn obj_mut(&mut self) -> &mut Self::Resource;
    fn store(&self) -> &Arc<dyn ObjectStore<Self::Resource>>;
    fn backoff(&self) -> &BackoffPolicy;

    fn key(&self) -> ObjectKey {
        self.obj().key()
    }
}

/// State of one invocation: the object as read at start, its store, the
/// backoff tiers and a workflow specific extension `W`.
///
/// Created fresh by the driver for every invocation and dropped at its end.
/// Workflows keep loaded remote objects and client handles in `ext` and
/// expose them to their actions through their own capability traits.
pub struct State<R: Resource, W = ()> {
    obj: R,
    store: Arc<dyn ObjectStore<R>>,
    backoff: Arc<BackoffPolicy>,
    pub ext: W,
}

impl<R: Resource, W> State<R, W> {
    pub fn new(obj: R, store: Arc<dyn ObjectStore<R>>, backoff: Arc<BackoffPolicy>, ext: W) -> Self {
        Self {
            obj,
            store,
            backoff,
            ext,
        }
    }

    pub fn into_obj(self) -> R {
        self.obj
    }
}

impl<R: Resource, W: Send + 'static> ObjectState for State<R, W> {
    type Resource = R;

    fn obj(&self) -> &R {
        &self.obj
    }

    fn obj_mut(&mut self) -> &mut R {
        &mut self.obj
    }

    fn store(&self) -> &Arc<dyn ObjectStore<R>> {
        &self.store
    }

    fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }
}
