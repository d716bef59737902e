//! Domain error types

use thiserror::Error;

/// Errors surfaced by session operations.
///
/// `NotFound`, `Conflict` and `Forbidden` are returned to the acting caller
/// and never broadcast. `Timeout` and `ProviderRejected` degrade facilitation
/// and are announced to the whole session as an `ArtifactFailed` event.
/// `Internal` indicates a broken invariant (e.g. an event sequence gap) and
/// quarantines the session from further writes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("artifact generation timed out")]
    Timeout,

    #[error("artifact generation rejected by provider: {0}")]
    ProviderRejected(String),

    #[error("internal invariant violation: {0}")]
    Internal(String),

    #[error("replay window exceeded, full snapshot required")]
    SnapshotRequired,

    #[error("operation cancelled")]
    Cancelled,
}

impl SessionError {
    /// True for errors that are answered to the caller only, with no
    /// session-wide broadcast.
    pub fn is_caller_only(&self) -> bool {
        matches!(
            self,
            SessionError::NotFound(_) | SessionError::Conflict(_) | SessionError::Forbidden(_)
        )
    }

    /// Check if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_only_classification() {
        assert!(SessionError::NotFound("x".into()).is_caller_only());
        assert!(SessionError::Forbidden("x".into()).is_caller_only());
        assert!(!SessionError::Timeout.is_caller_only());
        assert!(!SessionError::Internal("gap".into()).is_caller_only());
    }

    #[test]
    fn test_is_cancelled_check() {
        assert!(SessionError::Cancelled.is_cancelled());
        assert!(!SessionError::Timeout.is_cancelled());
    }
}
