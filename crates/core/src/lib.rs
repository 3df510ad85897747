//! Shared primitives for all Rust crates in Registra.

#![forbid(unsafe_code)]

/// Identifier newtypes shared across services.
pub mod ids;

use thiserror::Error;

pub use ids::{EventId, PersonId, ProcessId};

/// Result type used across Registra crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with concurrently committed state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An event with the same identifier was already persisted.
    #[error("duplicate event: {0}")]
    DuplicateEvent(String),

    /// The external change feed cannot be reached.
    #[error("change feed unavailable: {0}")]
    FeedUnavailable(String),

    /// The external audit history could not be fetched.
    #[error("audit fetch failed: {0}")]
    AuditFetchFailed(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn errors_render_their_category_prefix() {
        let error = AppError::FeedUnavailable("connection refused".to_owned());
        assert_eq!(
            error.to_string(),
            "change feed unavailable: connection refused"
        );

        let error = AppError::DuplicateEvent("event id collision".to_owned());
        assert_eq!(error.to_string(), "duplicate event: event id collision");
    }
}
