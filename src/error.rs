// ABOUTME: Application-wide error types for slipway.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

use crate::deploy::DeployError;
use crate::proxy::ProxyError;
use crate::session::SessionError;
use crate::store::StoreError;
use crate::types::DeploymentId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("unknown site: {0}")]
    UnknownSite(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("container runtime unavailable: {0}")]
    Runtime(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("deployment {deployment} of {site} failed: {message}")]
    DeployFailed {
        site: String,
        deployment: DeploymentId,
        message: String,
    },

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
