//! Condition list helpers and well-known condition types and reasons.

use chrono::Utc;

use crate::object::{Condition, ConditionStatus};

/// Resource is provisioned and usable.
pub const CONDITION_READY: &str = "Ready";
/// Resource failed; see reason and message.
pub const CONDITION_ERROR: &str = "Error";
/// Resource is degraded but may recover without user action.
pub const CONDITION_WARNING: &str = "Warning";
/// Work is in progress.
pub const CONDITION_PROCESSING: &str = "Processing";

/// Condition types of which at most one may be present after an exclusive write.
pub const TERMINAL_CONDITIONS: [&str; 3] = [CONDITION_READY, CONDITION_ERROR, CONDITION_WARNING];

pub const REASON_READY: &str = "Ready";
pub const REASON_PROCESSING: &str = "Processing";
pub const REASON_CONFLICT: &str = "Conflict";
pub const REASON_UNAUTHENTICATED: &str = "Unauthenticated";
pub const REASON_UNAUTHORIZED: &str = "Unauthorized";
pub const REASON_PROVIDER_ERROR: &str = "ProviderError";

/// Find a condition by type.
pub fn find_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions
        .iter()
        .find(|c| c.condition_type == condition_type)
}

/// True if the condition is present with status `True`.
pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    find_condition(conditions, condition_type).is_some_and(|c| c.status == ConditionStatus::True)
}

/// Add or replace a condition by type. Returns true if anything changed.
///
/// A replaced condition keeps its position in the list. The transition time
/// only moves when `status` flips.
pub fn set_condition(conditions: &mut Vec<Condition>, new: Condition) -> bool {
    let Some(existing) = conditions
        .iter_mut()
        .find(|c| c.condition_type == new.condition_type)
    else {
        conditions.push(new);
        return true;
    };

    let mut changed = false;
    if existing.status != new.status {
        existing.status = new.status;
        existing.last_transition_time = Utc::now();
        changed = true;
    }
    if existing.reason != new.reason {
        existing.reason = new.reason;
        changed = true;
    }
    if existing.message != new.message {
        existing.message = new.message;
        changed = true;
    }
    if existing.observed_generation != new.observed_generation {
        existing.observed_generation = new.observed_generation;
        changed = true;
    }
    changed
}

/// Remove a condition by type. Returns true if it was present.
pub fn remove_condition(conditions: &mut Vec<Condition>, condition_type: &str) -> bool {
    let before = conditions.len();
    conditions.retain(|c| c.condition_type != condition_type);
    conditions.len() != before
}

/// Replace the whole condition set with `keep`, preserving transition
/// times of conditions that already existed.
pub fn set_exclusive_conditions(conditions: &mut Vec<Condition>, keep: Vec<Condition>) -> bool {
    let mut changed = false;
    let before = conditions.len();
    conditions.retain(|c| keep.iter().any(|k| k.condition_type == c.condition_type));
    if conditions.len() != before {
        changed = true;
    }
    for c in keep {
        changed |= set_condition(conditions, c);
    }
    changed
}
