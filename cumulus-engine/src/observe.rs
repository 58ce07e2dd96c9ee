//! Per-invocation result reporting.
//!
//! Observers are purely observational and never affect scheduling.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::object::ObjectKey;
use crate::outcome::OutcomeKind;

/// Result label of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultLabel {
    Success,
    Error,
    Requeue,
    RequeueAfter,
    Canceled,
    Deadline,
}

impl ResultLabel {
    pub const ALL: [ResultLabel; 6] = [
        ResultLabel::Success,
        ResultLabel::Error,
        ResultLabel::Requeue,
        ResultLabel::RequeueAfter,
        ResultLabel::Canceled,
        ResultLabel::Deadline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultLabel::Success => "success",
            ResultLabel::Error => "error",
            ResultLabel::Requeue => "requeue",
            ResultLabel::RequeueAfter => "requeue_after",
            ResultLabel::Canceled => "canceled",
            ResultLabel::Deadline => "deadline",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ResultLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finished invocation.
#[derive(Debug, Clone)]
pub struct ReconcileRecord {
    pub workflow: String,
    pub key: ObjectKey,
    pub outcome: OutcomeKind,
    pub result: ResultLabel,
    pub duration: Duration,
    /// Labels attached by actions during the invocation.
    pub labels: BTreeMap<String, String>,
}

/// Sink for invocation records.
pub trait ReconcileObserver: Send + Sync {
    fn record(&self, record: &ReconcileRecord);
}

/// Logs every record through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ReconcileObserver for TracingObserver {
    fn record(&self, r: &ReconcileRecord) {
        let elapsed_ms = r.duration.as_millis() as u64;
        match r.result {
            ResultLabel::Error => warn!(
                workflow = %r.workflow,
                key = %r.key,
                result = %r.result,
                elapsed_ms,
                labels = ?r.labels,
                "Reconcile finished with error"
            ),
            ResultLabel::Success => info!(
                workflow = %r.workflow,
                key = %r.key,
                outcome = %r.outcome,
                elapsed_ms,
                labels = ?r.labels,
                "Reconcile finished"
            ),
            _ => debug!(
                workflow = %r.workflow,
                key = %r.key,
                result = %r.result,
                elapsed_ms,
                labels = ?r.labels,
                "Reconcile finished"
            ),
        }
    }
}

/// In-memory counters per result label.
#[derive(Debug, Default)]
pub struct ReconcileCounters {
    counts: [AtomicU64; 6],
}

impl ReconcileCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, label: ResultLabel) -> u64 {
        self.counts[label.index()].load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        ResultLabel::ALL.iter().map(|l| self.get(*l)).sum()
    }

    /// Snapshot of all counters, keyed by label name.
    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        ResultLabel::ALL
            .iter()
            .map(|l| (l.as_str(), self.get(*l)))
            .collect()
    }
}

impl ReconcileObserver for ReconcileCounters {
    fn record(&self, record: &ReconcileRecord) {
        self.counts[record.result.index()].fetch_add(1, Ordering::Relaxed);
    }
}

/// Fans a record out to several observers.
pub struct Observers(pub Vec<Arc<dyn ReconcileObserver>>);

impl ReconcileObserver for Observers {
    fn record(&self, record: &ReconcileRecord) {
        for observer in &self.0 {
            observer.record(record);
        }
    }
}
