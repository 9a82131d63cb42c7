// ABOUTME: Container collaborator: image builds, site containers, previews, health probes.
// ABOUTME: Defines the Containers and BuildPipeline traits and their Docker-backed implementations.

mod bollard;
mod build;
mod detection;
mod error;
mod health;

pub use bollard::BollardContainers;
pub use build::{BuildOutput, BuildPipeline, CliBuilder};
pub use detection::detect_socket;
pub use error::{BuildError, ContainerError};
pub use health::{probe_once, wait_until_healthy};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::store::SessionMode;
use crate::types::{BranchName, SiteName};

/// Label marking containers that serve editing-session previews.
pub const PREVIEW_LABEL: &str = "slipway.preview";

/// Label carrying the owning site's name.
pub const SITE_LABEL: &str = "slipway.site";

/// Tunables for starting and probing site containers.
#[derive(Debug, Clone)]
pub struct ContainerSettings {
    /// First host port tried for a site container.
    pub base_port: u16,
    /// Port the application listens on inside the container; passed as `PORT`.
    pub container_port: u16,
    pub health_path: String,
    pub health_timeout: Duration,
    pub health_interval: Duration,
    pub stop_timeout: Duration,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            base_port: 4000,
            container_port: 3000,
            health_path: "/".to_string(),
            health_timeout: Duration::from_secs(60),
            health_interval: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(10),
        }
    }
}

/// What to run for an editing-session preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSpec {
    pub container_name: String,
    pub site: SiteName,
    pub path: PathBuf,
    pub port: u16,
    pub branch: BranchName,
}

/// A preview that is up and listening on `port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewContainer {
    pub name: String,
    pub port: u16,
}

/// How a preview is backed, which decides what teardown must remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewStrategy {
    /// A runtime container with its own built image.
    Container,
    /// A lightweight process with nothing to remove beyond stopping it.
    Process,
}

/// A container known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub name: String,
    pub image: String,
    pub strategy: PreviewStrategy,
    pub running: bool,
}

/// Options for starting a production site container.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub env: HashMap<String, String>,
    pub persistent_storage: bool,
    /// Start beside the serving container instead of replacing it.
    pub blue_green: bool,
}

/// A production container that has been started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedContainer {
    pub container_id: String,
    pub port: u16,
    pub is_blue_green: bool,
}

/// Container lifecycle operations used by deployments and sessions.
#[async_trait]
pub trait Containers: Send + Sync {
    /// Build and run a preview for a session branch.
    ///
    /// Returns `None` when the working tree has nothing runnable.
    async fn create_container(
        &self,
        spec: &PreviewSpec,
        mode: SessionMode,
    ) -> Result<Option<PreviewContainer>, ContainerError>;

    /// Stop a container by name. Stopping a stopped container succeeds.
    async fn stop_container(&self, name: &str) -> Result<(), ContainerError>;

    /// Remove a container by name. A missing container is not an error.
    async fn remove_container(&self, name: &str, force: bool) -> Result<(), ContainerError>;

    /// Remove an image. A missing image is not an error.
    async fn remove_image(&self, image: &str) -> Result<(), ContainerError>;

    async fn is_container_running(&self, name: &str) -> Result<bool, ContainerError>;

    async fn get_container(&self, name: &str) -> Result<Option<ContainerRecord>, ContainerError>;

    /// Start a site container from a built image.
    async fn start_container(
        &self,
        image: &str,
        site: &SiteName,
        options: &StartOptions,
    ) -> Result<StartedContainer, ContainerError>;

    /// Poll the container on `port` until it answers or the budget runs out.
    async fn wait_for_container_health(&self, port: u16) -> Result<bool, ContainerError>;

    /// Retire the old serving container and promote the new one.
    async fn complete_blue_green(&self, site: &SiteName) -> Result<(), ContainerError>;

    /// Discard the new container and leave the old one serving.
    async fn rollback_blue_green(&self, site: &SiteName) -> Result<(), ContainerError>;
}

/// Name of the container that serves a site.
pub fn serving_name(site: &SiteName) -> String {
    format!("slipway-{site}")
}

/// Name of the container started beside the serving one during blue-green.
pub fn next_name(site: &SiteName) -> String {
    format!("slipway-{site}-next")
}

/// Named volume mounted for sites with persistent storage.
pub fn volume_name(site: &SiteName) -> String {
    format!("slipway-{site}-data")
}

/// Image tag for a preview container.
pub fn preview_image(container_name: &str) -> String {
    format!("{container_name}:latest")
}
