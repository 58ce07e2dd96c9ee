//! Pipeline outcomes and the scheduling instructions derived from them.

use std::fmt;
use std::time::Duration;

use crate::error::ReconcileError;

/// Result of running an [`Action`](crate::Action).
///
/// Every action returns exactly one outcome. Anything other than
/// [`Outcome::Continue`] stops the enclosing sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Proceed with the next step.
    Continue,
    /// A collaborator failed and the failure was not converted by a step.
    Error(ReconcileError),
    /// Done; do not reschedule until the next external event.
    StopForget,
    /// Reschedule as soon as possible.
    StopRequeue,
    /// Reschedule no earlier than the given delay. Zero means "asap".
    StopRequeueAfter(Duration),
}

impl Outcome {
    pub fn error(cause: impl Into<ReconcileError>) -> Self {
        Outcome::Error(cause.into())
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, Outcome::Continue)
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Continue => OutcomeKind::Continue,
            Outcome::Error(_) => OutcomeKind::Error,
            Outcome::StopForget => OutcomeKind::StopForget,
            Outcome::StopRequeue => OutcomeKind::StopRequeue,
            Outcome::StopRequeueAfter(_) => OutcomeKind::StopRequeueAfter,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Error(e) => write!(f, "error({e})"),
            Outcome::StopRequeueAfter(d) => write!(f, "stop_requeue_after({}ms)", d.as_millis()),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Variant tag of an [`Outcome`], without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Continue,
    Error,
    StopForget,
    StopRequeue,
    StopRequeueAfter,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Continue => "continue",
            OutcomeKind::Error => "error",
            OutcomeKind::StopForget => "stop_forget",
            OutcomeKind::StopRequeue => "stop_requeue",
            OutcomeKind::StopRequeueAfter => "stop_requeue_after",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the host scheduler should do with an object after an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingInstruction {
    /// Do not reschedule.
    None,
    /// Reschedule immediately.
    Now,
    /// Reschedule after the delay.
    After(Duration),
}

impl fmt::Display for SchedulingInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingInstruction::None => write!(f, "none"),
            SchedulingInstruction::Now => write!(f, "now"),
            SchedulingInstruction::After(d) => write!(f, "after({}ms)", d.as_millis()),
        }
    }
}
