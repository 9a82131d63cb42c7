// ABOUTME: Deployment pipeline steps as type state transitions.
// ABOUTME: Each step persists its status first, then consumes self and returns the next state.

use chrono::Utc;
use std::path::PathBuf;

use super::actions::discover_actions;
use super::build_log::BuildLog;
use super::error::DeployError;
use super::state::{Built, Cloned, Completed, HealthChecked, Initialized, Started, Switched};
use crate::config::resolve_env_map;
use crate::git::GitOps;
use crate::runtime::{BuildPipeline, Containers, StartOptions, StartedContainer};
use crate::store::{DeploymentStatus, Site, SiteStatus, Store};
use crate::types::DeploymentId;

/// Result type for transitions that hand the pipeline back on failure.
pub type TransitionResult<T, S> = Result<Pipeline<T>, (Pipeline<S>, DeployError)>;

/// Collaborators a pipeline step may call.
#[derive(Clone, Copy)]
pub struct Deps<'a> {
    pub store: &'a dyn Store,
    pub git: &'a dyn GitOps,
    pub containers: &'a dyn Containers,
    pub builder: &'a dyn BuildPipeline,
    pub log: &'a BuildLog,
}

/// One deployment attempt, parameterized by how far it has progressed.
#[derive(Debug)]
pub struct Pipeline<S> {
    deployment_id: DeploymentId,
    /// Site as it was before this attempt; rollback restores it.
    site: Site,
    work_path: PathBuf,
    blue_green: bool,
    state: S,
}

impl<S> Pipeline<S> {
    pub fn deployment_id(&self) -> DeploymentId {
        self.deployment_id
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn is_blue_green(&self) -> bool {
        self.blue_green
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    fn transition<T>(self, state: T) -> Pipeline<T> {
        Pipeline {
            deployment_id: self.deployment_id,
            site: self.site,
            work_path: self.work_path,
            blue_green: self.blue_green,
            state,
        }
    }

    async fn mark(&self, deps: Deps<'_>, status: DeploymentStatus) -> Result<(), DeployError> {
        deps.store
            .update_deployment_status(self.deployment_id, status, None)
            .await?;
        self.log(deps, &format!("status: {status}")).await;
        Ok(())
    }

    async fn log(&self, deps: Deps<'_>, text: &str) {
        deps.log.append(&self.site.name, self.deployment_id, text).await;
    }
}

impl Pipeline<Initialized> {
    /// Start a pipeline for an open deployment row.
    ///
    /// `blue_green` is set when the site already has a serving container.
    pub fn new(
        deployment_id: DeploymentId,
        site: Site,
        work_path: PathBuf,
        blue_green: bool,
    ) -> Self {
        Self {
            deployment_id,
            site,
            work_path,
            blue_green,
            state: Initialized,
        }
    }

    /// Clone or pull the site repository into the working path.
    #[must_use = "pipeline state must be used"]
    pub async fn fetch_source(self, deps: Deps<'_>) -> Result<Pipeline<Cloned>, DeployError> {
        self.mark(deps, DeploymentStatus::Cloning).await?;

        deps.git
            .clone_or_pull(&self.site.repo_url, &self.site.branch, &self.work_path)
            .await
            .map_err(|e| DeployError::SourceFailed(e.to_string()))?;

        Ok(self.transition(Cloned))
    }
}

impl Pipeline<Cloned> {
    /// Build an image tagged `slipway-<site>:<deployment id>`.
    #[must_use = "pipeline state must be used"]
    pub async fn build_image(self, deps: Deps<'_>) -> Result<Pipeline<Built>, DeployError> {
        self.mark(deps, DeploymentStatus::Building).await?;

        let tag = format!("slipway-{}:{}", self.site.name, self.deployment_id);
        let output = deps
            .builder
            .build(&self.site.name, &self.work_path, &tag)
            .await?;

        if !output.log.is_empty() {
            self.log(deps, &output.log).await;
        }

        if !output.success {
            return Err(DeployError::BuildFailed(
                output
                    .error
                    .unwrap_or_else(|| "build reported failure".to_string()),
            ));
        }

        let image = output.image;
        Ok(self.transition(Built { image }))
    }
}

impl Pipeline<Built> {
    /// Start the new container, beside the serving one when blue-green.
    #[must_use = "pipeline state must be used"]
    pub async fn start_container(self, deps: Deps<'_>) -> Result<Pipeline<Started>, DeployError> {
        self.mark(deps, DeploymentStatus::Starting).await?;

        let env = resolve_env_map(&self.site.env_vars)
            .map_err(|e| DeployError::Environment(e.to_string()))?;

        let options = StartOptions {
            env,
            persistent_storage: self.site.persistent_storage,
            blue_green: self.blue_green,
        };

        let container = deps
            .containers
            .start_container(&self.state.image, &self.site.name, &options)
            .await?;

        self.log(
            deps,
            &format!(
                "container {} listening on port {}",
                container.container_id, container.port
            ),
        )
        .await;

        Ok(self.transition(Started { container }))
    }
}

impl Pipeline<Started> {
    pub fn container(&self) -> &StartedContainer {
        &self.state.container
    }

    /// Wait for the new container to answer its health probe.
    ///
    /// On failure the pipeline is handed back so the caller can roll back.
    pub async fn health_check(self, deps: Deps<'_>) -> TransitionResult<HealthChecked, Started> {
        let port = self.state.container.port;

        match deps.containers.wait_for_container_health(port).await {
            Ok(true) => {}
            Ok(false) => return Err((self, DeployError::HealthCheckFailed(port))),
            Err(e) => return Err((self, DeployError::StartFailed(e.to_string()))),
        }

        if let Err(e) = self.mark(deps, DeploymentStatus::Healthy).await {
            return Err((self, e));
        }

        let container = self.state.container.clone();
        Ok(self.transition(HealthChecked { container }))
    }

    /// Undo this attempt after a failed health check.
    ///
    /// Blue-green attempts discard the new container and put the site back
    /// exactly as it was, ending `RolledBack`. First deploys have nothing to
    /// return to: the new container is removed, the site is marked `Error`,
    /// and the deployment ends `Failed`.
    pub async fn rollback(
        self,
        deps: Deps<'_>,
        reason: &DeployError,
    ) -> Result<DeploymentStatus, DeployError> {
        let message = reason.to_string();

        if self.blue_green {
            deps.containers
                .rollback_blue_green(&self.site.name)
                .await
                .map_err(|e| DeployError::RollbackFailed(e.to_string()))?;

            let mut site = self.site.clone();
            site.status = SiteStatus::Running;
            deps.store.update_site(&site).await?;

            deps.store
                .update_deployment_status(
                    self.deployment_id,
                    DeploymentStatus::RolledBack,
                    Some(message.clone()),
                )
                .await?;
            self.log(deps, &format!("rolled back: {message}")).await;
            return Ok(DeploymentStatus::RolledBack);
        }

        let id = &self.state.container.container_id;
        if let Err(e) = deps.containers.stop_container(id).await {
            tracing::warn!(container = %id, error = %e, "failed to stop unhealthy container");
        }
        if let Err(e) = deps.containers.remove_container(id, true).await {
            tracing::warn!(container = %id, error = %e, "failed to remove unhealthy container");
        }

        let mut site = self.site.clone();
        site.status = SiteStatus::Error;
        deps.store.update_site(&site).await?;

        deps.store
            .update_deployment_status(
                self.deployment_id,
                DeploymentStatus::Failed,
                Some(message.clone()),
            )
            .await?;
        self.log(deps, &format!("failed with nothing to roll back: {message}"))
            .await;
        Ok(DeploymentStatus::Failed)
    }
}

impl Pipeline<HealthChecked> {
    /// Move traffic to the new container.
    #[must_use = "pipeline state must be used"]
    pub async fn switch(self, deps: Deps<'_>) -> Result<Pipeline<Switched>, DeployError> {
        self.mark(deps, DeploymentStatus::Switching).await?;

        if self.blue_green {
            deps.containers
                .complete_blue_green(&self.site.name)
                .await
                .map_err(|e| DeployError::SwitchFailed(e.to_string()))?;
        }

        let container = self.state.container.clone();
        Ok(self.transition(Switched { container }))
    }
}

impl Pipeline<Switched> {
    /// The site row as served by the new container.
    pub fn serving_site(&self) -> Site {
        let mut site = self.site.clone();
        site.container_id = Some(self.state.container.container_id.clone());
        site.port = Some(self.state.container.port);
        site.status = SiteStatus::Running;
        site.last_deployed_at = Some(Utc::now());
        site
    }

    /// Record the new container on the site, refresh actions, and close the
    /// deployment as `Completed`.
    ///
    /// Action refresh is best-effort: the new version is already serving.
    #[must_use = "pipeline state must be used"]
    pub async fn finish(self, deps: Deps<'_>) -> Result<Pipeline<Completed>, DeployError> {
        let container = self.state.container.clone();

        let site = self.serving_site();
        deps.store.update_site(&site).await?;

        match discover_actions(site.id, &self.work_path).await {
            Ok(actions) => {
                if let Err(e) = deps.store.replace_site_actions(site.id, actions).await {
                    tracing::warn!(site = %site.name, error = %e, "failed to record site actions");
                    self.log(deps, &format!("site actions not updated: {e}")).await;
                }
            }
            Err(e) => {
                tracing::warn!(site = %site.name, error = %e, "failed to discover site actions");
            }
        }

        self.mark(deps, DeploymentStatus::Completed).await?;

        let mut done = self.transition(Completed { container });
        done.site = site;
        Ok(done)
    }
}
