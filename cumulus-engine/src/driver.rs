//! The driver: runs a pipeline for one object and turns its outcome into a
//! scheduling instruction for the host.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span};

use crate::action::ActionRef;
use crate::config::BackoffPolicy;
use crate::context::Context;
use crate::error::ReconcileError;
use crate::object::{ObjectKey, Resource};
use crate::observe::{ReconcileObserver, ReconcileRecord, ResultLabel, TracingObserver};
use crate::outcome::{Outcome, SchedulingInstruction};
use crate::state::State;
use crate::store::{ObjectStore, StoreError};

/// Entry point used by the host scheduler.
#[async_trait]
pub trait Reconcile: Send + Sync {
    /// Workflow name, used in logs and records.
    fn name(&self) -> &str;

    /// Reconcile the object identified by `key` once.
    ///
    /// The host guarantees that at most one invocation per key runs at a time.
    async fn invoke(&self, cancel: CancellationToken, key: &ObjectKey) -> SchedulingInstruction;

    /// Keys of every object this workflow is responsible for.
    ///
    /// Used by the host to resynchronize after it missed store events.
    async fn list_keys(&self) -> Result<Vec<ObjectKey>, StoreError>;
}

/// Builds the workflow extension of a fresh [`State`].
pub type ExtFactory<W> = Arc<dyn Fn(&ObjectKey) -> W + Send + Sync>;

/// Map a final outcome to a scheduling instruction and result label.
///
/// `Continue` falling off the end of a pipeline means done. Errors that were
/// not converted by a step requeue after the long backoff tier, except
/// cancellation and deadline, which are not retried by the driver.
pub fn schedule(outcome: &Outcome, backoff: &BackoffPolicy) -> (SchedulingInstruction, ResultLabel) {
    match outcome {
        Outcome::Continue | Outcome::StopForget => (SchedulingInstruction::None, ResultLabel::Success),
        Outcome::StopRequeue => (SchedulingInstruction::Now, ResultLabel::Requeue),
        Outcome::StopRequeueAfter(d) if d.is_zero() => {
            (SchedulingInstruction::Now, ResultLabel::RequeueAfter)
        }
        Outcome::StopRequeueAfter(d) => (SchedulingInstruction::After(*d), ResultLabel::RequeueAfter),
        Outcome::Error(ReconcileError::Cancelled) => (SchedulingInstruction::None, ResultLabel::Canceled),
        Outcome::Error(ReconcileError::DeadlineExceeded) => {
            (SchedulingInstruction::None, ResultLabel::Deadline)
        }
        Outcome::Error(_) => (SchedulingInstruction::After(backoff.long), ResultLabel::Error),
    }
}

/// Runs one workflow for objects of type `R`.
pub struct Reconciler<R: Resource, W: Send + 'static> {
    name: String,
    store: Arc<dyn ObjectStore<R>>,
    action: ActionRef<State<R, W>>,
    backoff: Arc<BackoffPolicy>,
    ext: ExtFactory<W>,
    observer: Arc<dyn ReconcileObserver>,
    timeout: Option<Duration>,
}

impl<R: Resource, W: Send + 'static> Reconciler<R, W> {
    pub fn builder(
        name: impl Into<String>,
        store: Arc<dyn ObjectStore<R>>,
        action: ActionRef<State<R, W>>,
        ext: impl Fn(&ObjectKey) -> W + Send + Sync + 'static,
    ) -> ReconcilerBuilder<R, W> {
        ReconcilerBuilder {
            inner: Reconciler {
                name: name.into(),
                store,
                action,
                backoff: Arc::new(BackoffPolicy::default()),
                ext: Arc::new(ext),
                observer: Arc::new(TracingObserver),
                timeout: None,
            },
        }
    }

    /// Render the pipeline as an indented tree.
    pub fn describe(&self) -> String {
        self.action.describe()
    }

    async fn run(&self, ctx: &mut Context, key: &ObjectKey) -> Option<Outcome> {
        let obj = match ctx.call(self.store.get(key)).await {
            Ok(obj) => obj,
            Err(ReconcileError::Store(e)) if e.is_not_found() => {
                debug!("Object not found, nothing to do");
                return None;
            }
            Err(e) => return Some(Outcome::Error(e)),
        };

        let mut state = State::new(
            obj,
            Arc::clone(&self.store),
            Arc::clone(&self.backoff),
            (self.ext)(key),
        );

        let outcome = match self.timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.action.run(ctx, &mut state)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Outcome::Error(ReconcileError::DeadlineExceeded),
                }
            }
            None => self.action.run(ctx, &mut state).await,
        };
        Some(outcome)
    }
}

#[async_trait]
impl<R: Resource, W: Send + 'static> Reconcile for Reconciler<R, W> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, cancel: CancellationToken, key: &ObjectKey) -> SchedulingInstruction {
        let start = Instant::now();
        let span = info_span!("reconcile", workflow = %self.name, key = %key);
        let mut ctx = Context::new(cancel, span.clone());

        let outcome = self.run(&mut ctx, key).instrument(span.clone()).await;
        let outcome = outcome.unwrap_or(Outcome::StopForget);
        let (instruction, result) = schedule(&outcome, &self.backoff);

        span.in_scope(|| {
            if let Outcome::Error(e) = &outcome {
                if !e.is_interrupt() {
                    error!(error = %e, "Reconcile failed");
                }
            }
            debug!(outcome = %outcome, %instruction, "Scheduling");
        });

        self.observer.record(&ReconcileRecord {
            workflow: self.name.clone(),
            key: key.clone(),
            outcome: outcome.kind(),
            result,
            duration: start.elapsed(),
            labels: ctx.labels().clone(),
        });
        instruction
    }

    async fn list_keys(&self) -> Result<Vec<ObjectKey>, StoreError> {
        self.store.list_keys().await
    }
}

pub struct ReconcilerBuilder<R: Resource, W: Send + 'static> {
    inner: Reconciler<R, W>,
}

impl<R: Resource, W: Send + 'static> ReconcilerBuilder<R, W> {
    pub fn backoff(mut self, backoff: Arc<BackoffPolicy>) -> Self {
        self.inner.backoff = backoff;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ReconcileObserver>) -> Self {
        self.inner.observer = observer;
        self
    }

    /// Abort invocations running longer than `limit`.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.inner.timeout = Some(limit);
        self
    }

    pub fn build(self) -> Reconciler<R, W> {
        self.inner
    }
}
