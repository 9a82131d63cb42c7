// ABOUTME: Container and build error types.
// ABOUTME: Maps Docker API status codes onto variants callers can branch on.

/// Errors from container operations.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("container not found: {0}")]
    NotFound(String),

    #[error("container already exists: {0}")]
    AlreadyExists(String),

    #[error("no free host port starting at {0}")]
    NoFreePort(u16),

    #[error("port {0} is already bound")]
    PortInUse(u16),

    #[error("preview build failed: {0}")]
    Build(#[from] BuildError),

    #[error("no blue-green deployment in progress for {0}")]
    NoPendingSwitch(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl ContainerError {
    pub(crate) fn from_api(e: bollard::errors::Error) -> Self {
        match &e {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => ContainerError::NotFound(message.clone()),
            bollard::errors::Error::DockerResponseServerError {
                status_code: 409,
                message,
            } => ContainerError::AlreadyExists(message.clone()),
            _ => ContainerError::Runtime(e.to_string()),
        }
    }

    /// Whether a start failed because the host port was taken.
    pub(crate) fn is_bind_conflict(e: &bollard::errors::Error) -> bool {
        let text = e.to_string();
        text.contains("port is already allocated") || text.contains("address already in use")
    }
}

/// Errors from image builds.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to launch build for {site}: {source}")]
    Spawn {
        site: String,
        source: std::io::Error,
    },

    #[error("no Dockerfile in {}", .0.display())]
    NoDockerfile(std::path::PathBuf),
}
