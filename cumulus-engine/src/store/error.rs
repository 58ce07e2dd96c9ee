//! Store error types.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Object not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Conflict with existing object.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Version mismatch (optimistic concurrency control).
    #[error("version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u64, actual: u64 },

    /// Internal error.
    #[error("internal: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
