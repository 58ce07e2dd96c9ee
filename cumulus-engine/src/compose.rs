//! Combinators that build pipelines out of actions.
//!
//! All combinators are actions themselves, so pipelines nest freely. None
//! of them retries or catches anything: the first outcome other than
//! `Continue` is handed to the caller unchanged.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::action::{Action, ActionRef, Predicate};
use crate::context::Context;
use crate::error::ReconcileError;
use crate::outcome::Outcome;

/// Runs its steps in order and stops at the first non-`Continue` outcome.
pub struct Sequence<S: Send + 'static> {
    name: String,
    steps: Vec<ActionRef<S>>,
}

#[async_trait]
impl<S: Send + 'static> Action<S> for Sequence<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut Context, state: &mut S) -> Outcome {
        for step in &self.steps {
            if ctx.is_cancelled() {
                debug!(sequence = %self.name, action = step.name(), "Cancelled before step");
                return Outcome::Error(ReconcileError::Cancelled);
            }

            trace!(sequence = %self.name, action = step.name(), "Running step");
            let outcome = step.run(ctx, state).await;
            if !outcome.is_continue() {
                debug!(
                    sequence = %self.name,
                    action = step.name(),
                    outcome = %outcome.kind(),
                    "Sequence stopped"
                );
                return outcome;
            }
        }
        Outcome::Continue
    }

    fn children(&self) -> Vec<&dyn Action<S>> {
        self.steps.iter().map(|s| s.as_ref()).collect()
    }
}

pub fn sequence<S: Send + 'static>(name: impl Into<String>, steps: Vec<ActionRef<S>>) -> ActionRef<S> {
    Arc::new(Sequence {
        name: name.into(),
        steps,
    })
}

/// Conditional: the predicate is evaluated once and exactly one branch runs.
/// A missing else-branch yields `Continue`.
pub struct Branch<S: Send + 'static> {
    name: String,
    predicate: Predicate<S>,
    then: ActionRef<S>,
    otherwise: Option<ActionRef<S>>,
}

#[async_trait]
impl<S: Send + 'static> Action<S> for Branch<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut Context, state: &mut S) -> Outcome {
        let taken = (self.predicate)(&*ctx, &*state);
        trace!(branch = %self.name, taken, "Predicate evaluated");
        if taken {
            self.then.run(ctx, state).await
        } else if let Some(otherwise) = &self.otherwise {
            otherwise.run(ctx, state).await
        } else {
            Outcome::Continue
        }
    }

    fn children(&self) -> Vec<&dyn Action<S>> {
        let mut children: Vec<&dyn Action<S>> = vec![self.then.as_ref()];
        if let Some(otherwise) = &self.otherwise {
            children.push(otherwise.as_ref());
        }
        children
    }
}

pub fn if_then<S: Send + 'static>(
    name: impl Into<String>,
    predicate: Predicate<S>,
    then: ActionRef<S>,
) -> ActionRef<S> {
    Arc::new(Branch {
        name: name.into(),
        predicate,
        then,
        otherwise: None,
    })
}

pub fn if_else<S: Send + 'static>(
    name: impl Into<String>,
    predicate: Predicate<S>,
    then: ActionRef<S>,
    otherwise: ActionRef<S>,
) -> ActionRef<S> {
    Arc::new(Branch {
        name: name.into(),
        predicate,
        then,
        otherwise: Some(otherwise),
    })
}

/// One arm of a [`Switch`].
pub struct Case<S: Send + 'static> {
    pub predicate: Predicate<S>,
    pub action: ActionRef<S>,
}

pub fn case<S: Send + 'static>(predicate: Predicate<S>, action: ActionRef<S>) -> Case<S> {
    Case { predicate, action }
}

/// First-match dispatch.
///
/// Cases are tried in declaration order; only the first matching case runs.
/// Earlier, more specific cases therefore shadow later, more general ones.
/// Without a match the default runs, and without a default the switch
/// yields `Continue`.
pub struct Switch<S: Send + 'static> {
    name: String,
    default: Option<ActionRef<S>>,
    cases: Vec<Case<S>>,
}

#[async_trait]
impl<S: Send + 'static> Action<S> for Switch<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut Context, state: &mut S) -> Outcome {
        for (idx, case) in self.cases.iter().enumerate() {
            if (case.predicate)(&*ctx, &*state) {
                trace!(switch = %self.name, case = idx, action = case.action.name(), "Case matched");
                return case.action.run(ctx, state).await;
            }
        }
        match &self.default {
            Some(default) => {
                trace!(switch = %self.name, action = default.name(), "No case matched, running default");
                default.run(ctx, state).await
            }
            None => Outcome::Continue,
        }
    }

    fn children(&self) -> Vec<&dyn Action<S>> {
        let mut children: Vec<&dyn Action<S>> =
            self.cases.iter().map(|c| c.action.as_ref()).collect();
        if let Some(default) = &self.default {
            children.push(default.as_ref());
        }
        children
    }
}

pub fn switch<S: Send + 'static>(
    name: impl Into<String>,
    default: Option<ActionRef<S>>,
    cases: Vec<Case<S>>,
) -> ActionRef<S> {
    Arc::new(Switch {
        name: name.into(),
        default,
        cases,
    })
}

/// Runs a sub-pipeline whose `StopForget` only ends that sub-pipeline.
///
/// Other outcomes pass through, so requeues and errors still stop the
/// enclosing sequence.
pub struct Isolated<S: Send + 'static> {
    name: String,
    inner: ActionRef<S>,
}

#[async_trait]
impl<S: Send + 'static> Action<S> for Isolated<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut Context, state: &mut S) -> Outcome {
        match self.inner.run(ctx, state).await {
            Outcome::StopForget => Outcome::Continue,
            other => other,
        }
    }

    fn children(&self) -> Vec<&dyn Action<S>> {
        vec![self.inner.as_ref()]
    }
}

pub fn isolated<S: Send + 'static>(name: impl Into<String>, inner: ActionRef<S>) -> ActionRef<S> {
    Arc::new(Isolated {
        name: name.into(),
        inner,
    })
}

/// Returns a fixed outcome. Used as an explicit pipeline terminator.
pub struct Passthrough {
    name: &'static str,
    outcome: Outcome,
}

#[async_trait]
impl<S: Send + 'static> Action<S> for Passthrough {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, _ctx: &mut Context, _state: &mut S) -> Outcome {
        self.outcome.clone()
    }
}

/// Continue unconditionally.
pub fn noop<S: Send + 'static>() -> ActionRef<S> {
    Arc::new(Passthrough {
        name: "continue",
        outcome: Outcome::Continue,
    })
}

/// Stop and do not reschedule.
pub fn stop_and_forget<S: Send + 'static>() -> ActionRef<S> {
    Arc::new(Passthrough {
        name: "stop-and-forget",
        outcome: Outcome::StopForget,
    })
}

/// Stop and reschedule immediately.
pub fn requeue<S: Send + 'static>() -> ActionRef<S> {
    Arc::new(Passthrough {
        name: "requeue",
        outcome: Outcome::StopRequeue,
    })
}

/// Stop and reschedule after `delay`.
pub fn requeue_after<S: Send + 'static>(delay: Duration) -> ActionRef<S> {
    Arc::new(Passthrough {
        name: "requeue-after",
        outcome: Outcome::StopRequeueAfter(delay),
    })
}

/// Declarative pipeline description, evaluated as a [`Sequence`].
///
/// ```ignore
/// let pipeline = Pipeline::new("network")
///     .then(add_finalizer(FINALIZER))
///     .then(Arc::new(LoadNetwork))
///     .branch("deleting", marked_for_deletion(), delete, create)
///     .build();
/// ```
pub struct Pipeline<S: Send + 'static> {
    name: String,
    steps: Vec<ActionRef<S>>,
}

impl<S: Send + 'static> Pipeline<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step.
    pub fn then(mut self, action: ActionRef<S>) -> Self {
        self.steps.push(action);
        self
    }

    /// Append a step that only runs when `predicate` holds.
    pub fn when(mut self, name: impl Into<String>, predicate: Predicate<S>, action: ActionRef<S>) -> Self {
        self.steps.push(if_then(name, predicate, action));
        self
    }

    /// Append a two-way branch.
    pub fn branch(
        mut self,
        name: impl Into<String>,
        predicate: Predicate<S>,
        then: ActionRef<S>,
        otherwise: ActionRef<S>,
    ) -> Self {
        self.steps.push(if_else(name, predicate, then, otherwise));
        self
    }

    /// Append an explicit terminator; later steps are unreachable.
    pub fn finish(self, terminator: ActionRef<S>) -> ActionRef<S> {
        self.then(terminator).build()
    }

    pub fn build(self) -> ActionRef<S> {
        sequence(self.name, self.steps)
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;
    use tracing::Span;

    use super::*;
    use crate::action::{predicate, step};

    #[derive(Default)]
    struct Trace {
        ran: Vec<&'static str>,
        flag: bool,
    }

    fn record(name: &'static str, outcome: Outcome) -> ActionRef<Trace> {
        step(name, move |_ctx, t: &mut Trace| {
            t.ran.push(name);
            outcome.clone()
        })
    }

    async fn run(action: &ActionRef<Trace>) -> (Outcome, Trace) {
        let mut ctx = Context::detached();
        let mut trace = Trace::default();
        let outcome = action.run(&mut ctx, &mut trace).await;
        (outcome, trace)
    }

    #[tokio::test]
    async fn test_sequence_short_circuits() {
        let seq = sequence(
            "seq",
            vec![
                record("a", Outcome::Continue),
                record("b", Outcome::StopRequeueAfter(Duration::from_secs(5))),
                record("c", Outcome::Continue),
            ],
        );

        let (outcome, trace) = run(&seq).await;
        assert_eq!(outcome, Outcome::StopRequeueAfter(Duration::from_secs(5)));
        assert_eq!(trace.ran, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_sequence_all_continue() {
        let seq = sequence(
            "seq",
            vec![record("a", Outcome::Continue), record("b", Outcome::Continue)],
        );
        let (outcome, trace) = run(&seq).await;
        assert_eq!(outcome, Outcome::Continue);
        assert_eq!(trace.ran, vec!["a", "b"]);

        let (outcome, _) = run(&sequence::<Trace>("empty", vec![])).await;
        assert_eq!(outcome, Outcome::Continue);
    }

    #[tokio::test]
    async fn test_nested_sequence_propagates() {
        let inner = sequence(
            "inner",
            vec![record("a", Outcome::StopForget), record("b", Outcome::Continue)],
        );
        let outer = sequence("outer", vec![inner, record("c", Outcome::Continue)]);

        let (outcome, trace) = run(&outer).await;
        assert_eq!(outcome, Outcome::StopForget);
        assert_eq!(trace.ran, vec!["a"]);
    }

    #[tokio::test]
    async fn test_isolated_contains_stop_forget() {
        let inner = sequence("inner", vec![record("a", Outcome::StopForget)]);
        let outer = sequence(
            "outer",
            vec![isolated("optional", inner), record("c", Outcome::StopRequeue)],
        );

        let (outcome, trace) = run(&outer).await;
        assert_eq!(outcome, Outcome::StopRequeue);
        assert_eq!(trace.ran, vec!["a", "c"]);

        let requeueing = isolated("r", record("x", Outcome::StopRequeue));
        let (outcome, _) = run(&requeueing).await;
        assert_eq!(outcome, Outcome::StopRequeue);
    }

    #[tokio::test]
    async fn test_switch_first_match() {
        let always = predicate(|_ctx, _t: &Trace| true);
        let sw = switch(
            "sw",
            Some(record("default", Outcome::Continue)),
            vec![
                case(predicate(|_ctx, _t: &Trace| false), record("never", Outcome::Continue)),
                case(always.clone(), record("first", Outcome::StopForget)),
                case(always, record("second", Outcome::StopRequeue)),
            ],
        );

        let (outcome, trace) = run(&sw).await;
        assert_eq!(outcome, Outcome::StopForget);
        assert_eq!(trace.ran, vec!["first"]);
    }

    #[tokio::test]
    async fn test_switch_default_and_empty() {
        let never = predicate(|_ctx, _t: &Trace| false);
        let sw = switch(
            "sw",
            Some(record("default", Outcome::StopRequeue)),
            vec![case(never.clone(), record("a", Outcome::Continue))],
        );
        let (outcome, trace) = run(&sw).await;
        assert_eq!(outcome, Outcome::StopRequeue);
        assert_eq!(trace.ran, vec!["default"]);

        let sw = switch("sw", None, vec![case(never, record("a", Outcome::Continue))]);
        let (outcome, trace) = run(&sw).await;
        assert_eq!(outcome, Outcome::Continue);
        assert!(trace.ran.is_empty());
    }

    #[tokio::test]
    async fn test_if_else_runs_one_branch() {
        let flagged = predicate(|_ctx, t: &Trace| t.flag);
        let branch = if_else(
            "flag",
            flagged.clone(),
            record("then", Outcome::Continue),
            record("else", Outcome::Continue),
        );

        let (_, trace) = run(&branch).await;
        assert_eq!(trace.ran, vec!["else"]);

        let mut ctx = Context::detached();
        let mut trace = Trace {
            flag: true,
            ..Default::default()
        };
        branch.run(&mut ctx, &mut trace).await;
        assert_eq!(trace.ran, vec!["then"]);

        let only_then = if_then("flag", flagged, record("then", Outcome::StopForget));
        let (outcome, trace) = run(&only_then).await;
        assert_eq!(outcome, Outcome::Continue);
        assert!(trace.ran.is_empty());
    }

    #[tokio::test]
    async fn test_predicate_sees_earlier_mutation() {
        let pipeline = Pipeline::new("p")
            .then(step("set", |_ctx, t: &mut Trace| {
                t.flag = true;
                Outcome::Continue
            }))
            .when("flagged", predicate(|_ctx, t: &Trace| t.flag), record("guarded", Outcome::Continue))
            .finish(stop_and_forget());

        let (outcome, trace) = run(&pipeline).await;
        assert_eq!(outcome, Outcome::StopForget);
        assert_eq!(trace.ran, vec!["guarded"]);
    }

    #[tokio::test]
    async fn test_passthroughs() {
        assert_eq!(run(&noop()).await.0, Outcome::Continue);
        assert_eq!(run(&stop_and_forget()).await.0, Outcome::StopForget);
        assert_eq!(run(&requeue()).await.0, Outcome::StopRequeue);
        assert_eq!(
            run(&requeue_after(Duration::ZERO)).await.0,
            Outcome::StopRequeueAfter(Duration::ZERO)
        );
    }

    #[tokio::test]
    async fn test_sequence_stops_when_cancelled() {
        let token = CancellationToken::new();
        let cancel = token.clone();
        let seq = sequence(
            "seq",
            vec![
                step("cancel", move |_ctx, t: &mut Trace| {
                    t.ran.push("cancel");
                    cancel.cancel();
                    Outcome::Continue
                }),
                record("after", Outcome::Continue),
            ],
        );

        let mut ctx = Context::new(token, Span::none());
        let mut trace = Trace::default();
        let outcome = seq.run(&mut ctx, &mut trace).await;
        assert_eq!(outcome, Outcome::Error(ReconcileError::Cancelled));
        assert_eq!(trace.ran, vec!["cancel"]);
    }

    #[test]
    fn test_describe_renders_tree() {
        let tree = Pipeline::new("root")
            .then(record("a", Outcome::Continue))
            .branch(
                "deleting",
                predicate(|_ctx, t: &Trace| t.flag),
                sequence("delete", vec![record("d", Outcome::Continue)]),
                record("create", Outcome::Continue),
            )
            .finish(stop_and_forget());

        assert_eq!(
            tree.describe(),
            "root\n  a\n  deleting\n    delete\n      d\n    create\n  stop-and-forget\n"
        );
    }
}
