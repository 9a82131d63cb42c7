// ABOUTME: Error types for editing-session operations.
// ABOUTME: Collaborator errors are flattened to messages so they never leak to callers.

use crate::git::GitError;
use crate::store::StoreError;
use crate::types::SessionId;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(SessionId),

    #[error("git operation failed: {0}")]
    Git(String),

    #[error("preview failed: {0}")]
    Preview(String),

    /// The branch could not be merged; the session stays in `failed`.
    #[error("failed to promote session {session}: {message}")]
    PromoteFailed { session: SessionId, message: String },

    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    NotFound,
    /// Git, container, or proxy collaborator failure.
    Upstream,
    Persistence,
}

impl SessionError {
    pub fn kind(&self) -> SessionErrorKind {
        match self {
            SessionError::NotFound(_) => SessionErrorKind::NotFound,
            SessionError::Persistence(_) => SessionErrorKind::Persistence,
            SessionError::Git(_)
            | SessionError::Preview(_)
            | SessionError::PromoteFailed { .. } => SessionErrorKind::Upstream,
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SessionNotFound(id) => SessionError::NotFound(id),
            other => SessionError::Persistence(other.to_string()),
        }
    }
}

impl From<GitError> for SessionError {
    fn from(err: GitError) -> Self {
        SessionError::Git(err.to_string())
    }
}
