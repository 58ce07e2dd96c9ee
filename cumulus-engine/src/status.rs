//! Condition/status manager.
//!
//! Computes the status implied by the current state and persists it with a
//! single `patch_status` call, or not at all if nothing changed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use crate::action::{Action, ActionRef, Predicate};
use crate::classify::store_failure_outcome;
use crate::conditions::{self, CONDITION_ERROR, CONDITION_READY, REASON_READY};
use crate::context::Context;
use crate::object::{Condition, Resource, StatusState};
use crate::outcome::Outcome;
use crate::state::ObjectState;

type Mutator<S> = Box<dyn Fn(&mut S) + Send + Sync>;

/// Status update step.
///
/// Changes are applied in a fixed order: `mutate`, state, removals (by type,
/// then by type and reason), the kept set, the exclusive condition set,
/// upserts. Afterwards `observed_generation` is set to the object's
/// generation. The write is skipped when the resulting status equals the
/// persisted one field by field.
pub struct UpdateStatus<S: ObjectState> {
    name: String,
    mutate: Option<Mutator<S>>,
    state: Option<StatusState>,
    removals: Vec<String>,
    reason_removals: Vec<(String, String)>,
    keep: Option<Vec<String>>,
    exclusive: Option<Vec<Condition>>,
    upserts: Vec<Condition>,
    on_success: Outcome,
    on_failure: Option<Outcome>,
    success_log: Option<String>,
    failure_log: Option<String>,
}

impl<S: ObjectState> UpdateStatus<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mutate: None,
            state: None,
            removals: Vec::new(),
            reason_removals: Vec::new(),
            keep: None,
            exclusive: None,
            upserts: Vec::new(),
            on_success: Outcome::StopForget,
            on_failure: None,
            success_log: None,
            failure_log: None,
        }
    }

    /// Replace the whole condition set with `conditions`.
    pub fn exclusive(mut self, conditions: Vec<Condition>) -> Self {
        self.exclusive = Some(conditions);
        self
    }

    /// Add or replace one condition, leaving the others untouched.
    pub fn set_condition(mut self, condition: Condition) -> Self {
        self.upserts.push(condition);
        self
    }

    pub fn remove_conditions<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.removals.extend(types.into_iter().map(Into::into));
        self
    }

    /// Remove a condition only while it still carries `reason`.
    pub fn remove_condition_if_reason(
        mut self,
        condition_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        self.reason_removals
            .push((condition_type.into(), reason.into()));
        self
    }

    /// Drop every condition whose type is not listed. Conditions set by this
    /// update are applied afterwards and always survive.
    pub fn keep_conditions<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.keep
            .get_or_insert_with(Vec::new)
            .extend(types.into_iter().map(Into::into));
        self
    }

    pub fn state(mut self, state: StatusState) -> Self {
        self.state = Some(state);
        self
    }

    /// Change resource specific status fields from the invocation state.
    pub fn mutate<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut S) + Send + Sync + 'static,
    {
        self.mutate = Some(Box::new(f));
        self
    }

    /// Outcome after a successful or skipped write. Default `StopForget`.
    pub fn on_success(mut self, outcome: Outcome) -> Self {
        self.on_success = outcome;
        self
    }

    /// Outcome after a failed write, replacing the classified one.
    /// Cancellation still ends the invocation as cancelled.
    pub fn on_failure(mut self, outcome: Outcome) -> Self {
        self.on_failure = Some(outcome);
        self
    }

    pub fn success_log(mut self, message: impl Into<String>) -> Self {
        self.success_log = Some(message.into());
        self
    }

    pub fn failure_log(mut self, message: impl Into<String>) -> Self {
        self.failure_log = Some(message.into());
        self
    }

    pub fn into_action(self) -> ActionRef<S> {
        Arc::new(self)
    }

    /// Apply the changes to `state` and persist them if needed.
    pub async fn apply(&self, ctx: &mut Context, state: &mut S) -> Outcome {
        let before = state.obj().status().clone();

        if let Some(mutate) = &self.mutate {
            mutate(&mut *state);
        }

        let generation = state.obj().meta().generation;
        let status = state.obj_mut().status_mut();
        if let Some(s) = self.state {
            status.state = Some(s);
        }
        for condition_type in &self.removals {
            conditions::remove_condition(&mut status.conditions, condition_type);
        }
        for (condition_type, reason) in &self.reason_removals {
            status
                .conditions
                .retain(|c| !(&c.condition_type == condition_type && &c.reason == reason));
        }
        if let Some(keep) = &self.keep {
            status.conditions.retain(|c| keep.contains(&c.condition_type));
        }
        if let Some(exclusive) = &self.exclusive {
            conditions::set_exclusive_conditions(
                &mut status.conditions,
                with_generation(exclusive, generation),
            );
        }
        for condition in with_generation(&self.upserts, generation) {
            conditions::set_condition(&mut status.conditions, condition);
        }
        status.observed_generation = generation;

        let key = state.key();
        if *state.obj().status() == before {
            trace!(%key, update = %self.name, "Status unchanged, skipping write");
            return self.on_success.clone();
        }

        let store = Arc::clone(state.store());
        match ctx.call(store.patch_status(state.obj_mut())).await {
            Ok(()) => {
                match &self.success_log {
                    Some(msg) => debug!(%key, update = %self.name, "{}", msg),
                    None => debug!(%key, update = %self.name, "Status updated"),
                }
                self.on_success.clone()
            }
            Err(err) => {
                let msg = self.failure_log.as_deref().unwrap_or("Failed to update status");
                warn!(%key, update = %self.name, error = %err, "{}", msg);
                match &self.on_failure {
                    Some(outcome) if !err.is_interrupt() => outcome.clone(),
                    _ => store_failure_outcome(err, state.backoff()),
                }
            }
        }
    }
}

fn with_generation(conditions: &[Condition], generation: i64) -> Vec<Condition> {
    conditions
        .iter()
        .cloned()
        .map(|mut c| {
            c.observed_generation = generation;
            c
        })
        .collect()
}

#[async_trait]
impl<S: ObjectState> Action<S> for UpdateStatus<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut Context, state: &mut S) -> Outcome {
        self.apply(ctx, state).await
    }
}

/// True when the status does not reflect the current generation yet, or
/// carries no conditions at all.
///
/// Guards progress updates that should be written once per generation.
pub fn is_stale<S: ObjectState>() -> Predicate<S> {
    Arc::new(|_ctx: &Context, state: &S| {
        let obj = state.obj();
        obj.meta().generation != obj.status().observed_generation
            || obj.status().conditions.is_empty()
    })
}

/// Exclusive Ready condition and Ready state.
pub fn ready<S: ObjectState>(message: impl Into<String>) -> UpdateStatus<S> {
    UpdateStatus::new("status-ready")
        .exclusive(vec![Condition::active(CONDITION_READY, REASON_READY, message)])
        .state(StatusState::Ready)
}

/// Exclusive Error condition, Error state and `StopForget`.
///
/// For workflow precondition violations: retrying would not help, so the
/// object waits for a human to notice the condition.
pub fn logic_failure<S: ObjectState>(
    reason: impl Into<String>,
    message: impl Into<String>,
) -> UpdateStatus<S> {
    UpdateStatus::new("status-logic-failure")
        .exclusive(vec![Condition::active(CONDITION_ERROR, reason, message)])
        .state(StatusState::Error)
        .on_success(Outcome::StopForget)
}
