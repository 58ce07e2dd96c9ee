//! Finalizer lifecycle steps.
//!
//! A finalizer is a deletion guard: the store keeps an object that is marked
//! for deletion until all its finalizers are gone. Workflows add their token
//! first thing and remove it as the very last step of deletion, after the
//! remote resource is confirmed gone.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::action::{Action, ActionRef, Predicate};
use crate::classify::store_failure_outcome;
use crate::context::Context;
use crate::object::Resource;
use crate::outcome::Outcome;
use crate::state::ObjectState;

/// Adds a finalizer token if missing.
///
/// Skipped for objects already marked for deletion, since a new guard on a
/// dying object would never be cleaned up by the create path.
pub struct AddFinalizer {
    token: String,
}

#[async_trait]
impl<S: ObjectState> Action<S> for AddFinalizer {
    fn name(&self) -> &str {
        "add-finalizer"
    }

    async fn run(&self, ctx: &mut Context, state: &mut S) -> Outcome {
        let meta = state.obj().meta();
        if meta.is_marked_for_deletion() || meta.has_finalizer(&self.token) {
            return Outcome::Continue;
        }

        let store = Arc::clone(state.store());
        match ctx.call(store.add_finalizer(state.obj_mut(), &self.token)).await {
            Ok(added) => {
                if added {
                    debug!(key = %state.key(), token = %self.token, "Finalizer added");
                }
                Outcome::Continue
            }
            Err(err) => store_failure_outcome(err, state.backoff()),
        }
    }
}

/// Removes a finalizer token if present.
///
/// Must be the last step of a deletion pipeline; once the token is gone the
/// store may physically remove the object.
pub struct RemoveFinalizer {
    token: String,
}

#[async_trait]
impl<S: ObjectState> Action<S> for RemoveFinalizer {
    fn name(&self) -> &str {
        "remove-finalizer"
    }

    async fn run(&self, ctx: &mut Context, state: &mut S) -> Outcome {
        if !state.obj().meta().has_finalizer(&self.token) {
            return Outcome::Continue;
        }

        let store = Arc::clone(state.store());
        match ctx
            .call(store.remove_finalizer(state.obj_mut(), &self.token))
            .await
        {
            Ok(removed) => {
                if removed {
                    info!(key = %state.key(), token = %self.token, "Finalizer removed");
                }
                Outcome::Continue
            }
            Err(err) => store_failure_outcome(err, state.backoff()),
        }
    }
}

pub fn add_finalizer<S: ObjectState>(token: impl Into<String>) -> ActionRef<S> {
    Arc::new(AddFinalizer {
        token: token.into(),
    })
}

pub fn remove_finalizer<S: ObjectState>(token: impl Into<String>) -> ActionRef<S> {
    Arc::new(RemoveFinalizer {
        token: token.into(),
    })
}

/// True once deletion was requested for the object.
pub fn marked_for_deletion<S: ObjectState>() -> Predicate<S> {
    Arc::new(|_ctx: &Context, state: &S| state.obj().meta().is_marked_for_deletion())
}

pub fn has_finalizer<S: ObjectState>(token: impl Into<String>) -> Predicate<S> {
    let token = token.into();
    Arc::new(move |_ctx: &Context, state: &S| state.obj().meta().has_finalizer(&token))
}
