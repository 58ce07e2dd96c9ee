//! Error classification and backoff policy.
//!
//! Maps heterogeneous collaborator failures onto a fixed taxonomy and each
//! kind onto an outcome, an optional condition and an optional status state.
//! Call sites customize wording, never the policy.

use std::fmt;

use tracing::{debug, info, warn};

use crate::conditions::{
    CONDITION_ERROR, CONDITION_WARNING, REASON_CONFLICT, REASON_PROVIDER_ERROR,
    REASON_UNAUTHENTICATED, REASON_UNAUTHORIZED,
};
use crate::config::BackoffPolicy;
use crate::context::Context;
use crate::error::{ProviderError, ReconcileError};
use crate::object::{Condition, StatusState};
use crate::outcome::Outcome;
use crate::state::ObjectState;
use crate::status::UpdateStatus;
use crate::store::StoreError;

/// Failure taxonomy, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Absence. A valid state that callers branch on.
    NotFound,
    /// Rate limited by the provider.
    TooManyRequests,
    /// Concurrent modification.
    Conflict,
    /// Credentials invalid.
    Unauthenticated,
    /// Credentials valid, permissions insufficient.
    Unauthorized,
    /// Workflow precondition violated.
    Logic,
    /// Anything else.
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::TooManyRequests => "too_many_requests",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Logic => "logic",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can be placed in the taxonomy.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

const CODE_RESOURCE_NOT_FOUND: &str = "ResourceNotFound";
const CODE_TOO_MANY_REQUESTS: &str = "TooManyRequests";
const CODE_CONFLICT: &str = "Conflict";
const CODE_AUTHENTICATION_FAILED: &str = "AuthenticationFailed";
const CODE_INVALID_TOKEN_TENANT: &str = "InvalidAuthenticationTokenTenant";
const CODE_AUTHORIZATION_FAILED: &str = "AuthorizationFailed";

impl Classify for ProviderError {
    fn kind(&self) -> ErrorKind {
        let code = self.code.as_deref();
        let status = self.status;

        if status == Some(404) || code == Some(CODE_RESOURCE_NOT_FOUND) {
            ErrorKind::NotFound
        } else if status == Some(429) || code == Some(CODE_TOO_MANY_REQUESTS) {
            ErrorKind::TooManyRequests
        } else if status == Some(409) || code == Some(CODE_CONFLICT) {
            ErrorKind::Conflict
        } else if status == Some(401)
            || code == Some(CODE_AUTHENTICATION_FAILED)
            || code == Some(CODE_INVALID_TOKEN_TENANT)
        {
            ErrorKind::Unauthenticated
        } else if status == Some(403) || code == Some(CODE_AUTHORIZATION_FAILED) {
            ErrorKind::Unauthorized
        } else {
            ErrorKind::Unknown
        }
    }
}

impl Classify for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Conflict(_) | StoreError::VersionMismatch { .. } => ErrorKind::Conflict,
            StoreError::Internal(_) => ErrorKind::Unknown,
        }
    }
}

impl Classify for ReconcileError {
    fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::Store(e) => e.kind(),
            ReconcileError::Provider(e) => e.kind(),
            ReconcileError::Logic(_) => ErrorKind::Logic,
            ReconcileError::Cancelled | ReconcileError::DeadlineExceeded => ErrorKind::Unknown,
        }
    }
}

/// What to do about a classified error.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub outcome: Outcome,
    /// Condition to record exclusively, if any.
    pub condition: Option<Condition>,
    /// Status state to record alongside the condition.
    pub state: Option<StatusState>,
}

/// Classifier with per call site wording.
///
/// ```ignore
/// let handler = ErrorHandler::new()
///     .with_default_reason("NetworkCreateFailed")
///     .with_default_message("Failed to create network");
/// return handler.handle(ctx, state, err).await;
/// ```
#[derive(Debug, Clone)]
pub struct ErrorHandler {
    default_reason: String,
    default_message: Option<String>,
    conflict_message: String,
    too_many_requests_message: String,
    not_found_message: String,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self {
            default_reason: REASON_PROVIDER_ERROR.to_string(),
            default_message: None,
            conflict_message: "Resource was modified concurrently, will retry".to_string(),
            too_many_requests_message: "Too many requests, will retry".to_string(),
            not_found_message: "Resource not found".to_string(),
        }
    }

    /// Reason of the Error condition for unclassified and logic errors.
    pub fn with_default_reason(mut self, reason: impl Into<String>) -> Self {
        self.default_reason = reason.into();
        self
    }

    /// Message of the Error condition for unclassified errors. Defaults to
    /// the error's own message.
    pub fn with_default_message(mut self, message: impl Into<String>) -> Self {
        self.default_message = Some(message.into());
        self
    }

    pub fn with_conflict_message(mut self, message: impl Into<String>) -> Self {
        self.conflict_message = message.into();
        self
    }

    /// Logged when rate limited. No condition is recorded for that case.
    pub fn with_too_many_requests_message(mut self, message: impl Into<String>) -> Self {
        self.too_many_requests_message = message.into();
        self
    }

    /// Logged on not-found.
    pub fn with_not_found_message(mut self, message: impl Into<String>) -> Self {
        self.not_found_message = message.into();
        self
    }

    /// Classify `err`. Pure; performs no I/O.
    pub fn classify(&self, err: &ReconcileError, backoff: &BackoffPolicy) -> Classification {
        let kind = err.kind();
        let (outcome, condition, state) = match kind {
            ErrorKind::NotFound => (Outcome::Continue, None, None),
            ErrorKind::TooManyRequests => (Outcome::StopRequeueAfter(backoff.short), None, None),
            ErrorKind::Conflict => (
                Outcome::StopRequeueAfter(backoff.short),
                Some(Condition::active(
                    CONDITION_WARNING,
                    REASON_CONFLICT,
                    self.conflict_message.clone(),
                )),
                Some(StatusState::Warning),
            ),
            ErrorKind::Unauthenticated => (
                Outcome::StopRequeueAfter(backoff.long),
                Some(Condition::active(
                    CONDITION_WARNING,
                    REASON_UNAUTHENTICATED,
                    error_message(err),
                )),
                Some(StatusState::Warning),
            ),
            ErrorKind::Unauthorized => (
                Outcome::StopRequeueAfter(backoff.long),
                Some(Condition::active(
                    CONDITION_WARNING,
                    REASON_UNAUTHORIZED,
                    error_message(err),
                )),
                Some(StatusState::Warning),
            ),
            ErrorKind::Logic => (
                Outcome::StopForget,
                Some(Condition::active(
                    CONDITION_ERROR,
                    self.default_reason.clone(),
                    error_message(err),
                )),
                Some(StatusState::Error),
            ),
            ErrorKind::Unknown => (
                Outcome::StopRequeueAfter(backoff.long),
                Some(Condition::active(
                    CONDITION_ERROR,
                    self.default_reason.clone(),
                    self.default_message
                        .clone()
                        .unwrap_or_else(|| error_message(err)),
                )),
                Some(StatusState::Error),
            ),
        };

        Classification {
            kind,
            outcome,
            condition,
            state,
        }
    }

    /// Classify `err`, record the resulting condition exclusively and
    /// return the outcome.
    ///
    /// Cancellation and deadline errors are returned unchanged so the driver
    /// can report them as such.
    pub async fn handle<S: ObjectState>(
        &self,
        ctx: &mut Context,
        state: &mut S,
        err: impl Into<ReconcileError>,
    ) -> Outcome {
        let err = err.into();
        if err.is_interrupt() {
            return Outcome::Error(err);
        }

        let classification = self.classify(&err, state.backoff());
        let key = state.key();
        match classification.kind {
            ErrorKind::NotFound => debug!(%key, error = %err, "{}", self.not_found_message),
            ErrorKind::TooManyRequests => info!(%key, error = %err, "{}", self.too_many_requests_message),
            ErrorKind::Unknown | ErrorKind::Logic => {
                warn!(%key, error = %err, kind = %classification.kind, "Reconcile step failed")
            }
            kind => info!(%key, error = %err, %kind, "Reconcile step failed, will retry"),
        }

        let Some(condition) = classification.condition else {
            return classification.outcome;
        };

        let mut update = UpdateStatus::new("record-error")
            .exclusive(vec![condition])
            .on_success(classification.outcome);
        if let Some(status_state) = classification.state {
            update = update.state(status_state);
        }
        update.apply(ctx, state).await
    }
}

/// Outcome for a failed store call that has no condition to record.
///
/// A vanished object ends the invocation; other errors take the classifier's
/// outcome.
pub(crate) fn store_failure_outcome(err: ReconcileError, backoff: &BackoffPolicy) -> Outcome {
    if err.is_interrupt() {
        return Outcome::Error(err);
    }
    match err.kind() {
        ErrorKind::NotFound => Outcome::StopForget,
        _ => ErrorHandler::new().classify(&err, backoff).outcome,
    }
}

fn error_message(err: &ReconcileError) -> String {
    match err {
        ReconcileError::Provider(e) => e.message.clone(),
        ReconcileError::Logic(msg) => msg.clone(),
        other => other.to_string(),
    }
}
