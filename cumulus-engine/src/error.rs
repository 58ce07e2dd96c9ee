//! Error types shared by actions, the store boundary and provider clients.

use thiserror::Error;

use crate::store::StoreError;

/// Error returned by a cloud-provider collaborator.
///
/// Providers report failures in very different shapes. Clients normalize them
/// into a transport status code and an optional provider error code so the
/// classifier can map them onto retry policies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (status: {status:?}, code: {code:?})")]
pub struct ProviderError {
    /// Transport status code (HTTP-like), if the call got that far.
    pub status: Option<u16>,
    /// Provider specific error code, e.g. `AuthorizationFailed`.
    pub code: Option<String>,
    /// Human readable message.
    pub message: String,
}

impl ProviderError {
    pub fn new(status: Option<u16>, code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(Some(status), None, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Some(404), Some("ResourceNotFound"), message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::with_status(429, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(Some(409), Some("Conflict"), message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(Some(401), Some("AuthenticationFailed"), message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(Some(403), Some("AuthorizationFailed"), message)
    }

    /// Failure without any transport status, e.g. a broken connection.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(None, None, message)
    }
}

/// Cause carried by [`Outcome::Error`](crate::Outcome::Error).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    /// Object store call failed.
    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// Cloud provider call failed.
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),

    /// A workflow precondition was violated. Never retried blindly.
    #[error("logic error: {0}")]
    Logic(String),

    /// The invocation was cancelled by the host.
    #[error("invocation cancelled")]
    Cancelled,

    /// The invocation ran past its deadline.
    #[error("invocation deadline exceeded")]
    DeadlineExceeded,
}

impl ReconcileError {
    pub fn logic(message: impl Into<String>) -> Self {
        ReconcileError::Logic(message.into())
    }

    /// True for cancellation and deadline errors, which end an invocation
    /// without being reported as failures.
    pub fn is_interrupt(&self) -> bool {
        matches!(
            self,
            ReconcileError::Cancelled | ReconcileError::DeadlineExceeded
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
