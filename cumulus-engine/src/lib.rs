//! Generic reconciliation engine.
//!
//! Workflows are pipelines of named [`Action`]s composed with sequence,
//! branch and switch combinators. Every action returns an [`Outcome`]; the
//! [`Reconciler`] maps the final outcome of an invocation to a
//! [`SchedulingInstruction`] for the host scheduler.

pub mod action;
pub mod classify;
pub mod compose;
pub mod conditions;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod finalizer;
pub mod object;
pub mod observe;
pub mod outcome;
pub mod state;
pub mod status;
pub mod store;

pub use action::{Action, ActionRef, Predicate, not, predicate, step};
pub use classify::{Classification, Classify, ErrorHandler, ErrorKind};
pub use compose::{
    Pipeline, case, if_else, if_then, isolated, noop, requeue, requeue_after, sequence,
    stop_and_forget, switch,
};
pub use config::BackoffPolicy;
pub use context::Context;
pub use driver::{Reconcile, Reconciler, schedule};
pub use error::{ProviderError, ReconcileError};
pub use finalizer::{add_finalizer, has_finalizer, marked_for_deletion, remove_finalizer};
pub use object::{
    Condition, ConditionStatus, Object, ObjectKey, ObjectMeta, Resource, Spec, Status, StatusState,
};
pub use observe::{ReconcileCounters, ReconcileObserver, ReconcileRecord, ResultLabel, TracingObserver};
pub use outcome::{Outcome, OutcomeKind, SchedulingInstruction};
pub use state::{ObjectState, State};
pub use status::{UpdateStatus, is_stale, logic_failure, ready};
pub use store::{Event, MemoryStore, ObjectStore, StoreError};
