// ABOUTME: Error types for deployment operations.
// ABOUTME: Covers source, build, start, health, switch, and persistence failures.

use crate::runtime::{BuildError, ContainerError};
use crate::store::StoreError;
use crate::types::{DeploymentId, SiteId};

/// Errors raised while deploying or stopping a site.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("site not found: {0}")]
    SiteNotFound(SiteId),

    #[error("deployment not found: {0}")]
    DeploymentNotFound(DeploymentId),

    /// The serving container's state could not be read, so no container
    /// was touched.
    #[error("could not inspect serving container: {0}")]
    InspectFailed(String),

    /// Clone or pull of the site repository failed.
    #[error("failed to fetch source: {0}")]
    SourceFailed(String),

    #[error("image build failed: {0}")]
    BuildFailed(String),

    /// A site environment variable could not be resolved.
    #[error("environment error: {0}")]
    Environment(String),

    #[error("failed to start container: {0}")]
    StartFailed(String),

    #[error("health check failed for container on port {0}")]
    HealthCheckFailed(u16),

    #[error("failed to switch traffic: {0}")]
    SwitchFailed(String),

    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    #[error("failed to stop container: {0}")]
    StopFailed(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    /// A referenced site or deployment does not exist.
    NotFound,
    /// Git, build, or container collaborator failure.
    Upstream,
    /// The store rejected or failed a write.
    Persistence,
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::SiteNotFound(_) | DeployError::DeploymentNotFound(_) => {
                DeployErrorKind::NotFound
            }
            DeployError::Persistence(_) => DeployErrorKind::Persistence,
            _ => DeployErrorKind::Upstream,
        }
    }
}

impl From<StoreError> for DeployError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SiteNotFound(id) => DeployError::SiteNotFound(id),
            StoreError::DeploymentNotFound(id) => DeployError::DeploymentNotFound(id),
            other => DeployError::Persistence(other.to_string()),
        }
    }
}

impl From<BuildError> for DeployError {
    fn from(err: BuildError) -> Self {
        DeployError::BuildFailed(err.to_string())
    }
}

impl From<ContainerError> for DeployError {
    fn from(err: ContainerError) -> Self {
        DeployError::StartFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_rows_are_not_found() {
        let err: DeployError = StoreError::SiteNotFound(SiteId::new(4)).into();
        assert_eq!(err.kind(), DeployErrorKind::NotFound);
        assert_eq!(err.to_string(), "site not found: 4");
    }

    #[test]
    fn store_io_is_persistence() {
        let io = std::io::Error::other("disk full");
        let err: DeployError = StoreError::Io(io).into();
        assert_eq!(err.kind(), DeployErrorKind::Persistence);
    }

    #[test]
    fn collaborator_failures_are_upstream() {
        assert_eq!(
            DeployError::HealthCheckFailed(4001).kind(),
            DeployErrorKind::Upstream
        );
        assert_eq!(
            DeployError::from(ContainerError::NoFreePort(4000)).kind(),
            DeployErrorKind::Upstream
        );
    }
}
