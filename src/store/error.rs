// ABOUTME: Error types for persistence operations.
// ABOUTME: Covers missing rows, rejected status transitions, and snapshot I/O.

use super::records::DeploymentStatus;
use crate::types::{DeploymentId, SessionId, SiteId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("site not found: {0}")]
    SiteNotFound(SiteId),

    #[error("site already exists: {0}")]
    DuplicateSite(String),

    #[error("deployment not found: {0}")]
    DeploymentNotFound(DeploymentId),

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("deployment {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: DeploymentId,
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    #[error("state file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}
