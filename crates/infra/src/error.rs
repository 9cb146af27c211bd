//! Persistence error shared by every store.

use celestia_core::DomainError;

/// Store error.
///
/// In-memory and Postgres implementations report the same variants so the
/// layers above never match on backend-specific failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Conditional update did not match the current state.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Unique constraint hit where the caller did not expect one.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored row could not be turned back into a domain value.
    #[error("decode error: {0}")]
    Decode(String),

    /// Backend unreachable (pool closed, I/O, poisoned lock).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    pub(crate) fn poisoned(store: &str) -> Self {
        StoreError::Unavailable(format!("{store} lock poisoned"))
    }
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidTransition(msg) | DomainError::InvariantViolation(msg) => {
                StoreError::InvalidTransition(msg)
            }
            other => StoreError::Decode(other.to_string()),
        }
    }
}
