// ABOUTME: Deployment orchestrator: drives one site through the blue-green pipeline.
// ABOUTME: Converts every pipeline failure into a recorded deployment outcome.

use std::path::PathBuf;
use std::sync::Arc;

use super::build_log::BuildLog;
use super::error::DeployError;
use super::lock::SiteLocks;
use super::pipeline::{Deps, Pipeline};
use crate::git::GitOps;
use crate::runtime::{BuildPipeline, Containers};
use crate::store::{Deployment, DeploymentStatus, Site, SiteStatus, Store, StoreError};
use crate::types::{DeploymentId, SiteId, SiteName};

/// Filesystem locations used by deployments.
#[derive(Debug, Clone)]
pub struct DeploySettings {
    /// Parent of every site's working tree.
    pub sites_root: PathBuf,
    /// Directory for per-site build logs; `None` logs through tracing only.
    pub logs_dir: Option<PathBuf>,
}

/// Outcome of one `deploy` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub success: bool,
    pub deployment_id: DeploymentId,
    pub error: Option<String>,
}

/// Deploys and stops sites using injected collaborators.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    git: Arc<dyn GitOps>,
    containers: Arc<dyn Containers>,
    builder: Arc<dyn BuildPipeline>,
    settings: DeploySettings,
    log: BuildLog,
    locks: SiteLocks,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        git: Arc<dyn GitOps>,
        containers: Arc<dyn Containers>,
        builder: Arc<dyn BuildPipeline>,
        settings: DeploySettings,
    ) -> Self {
        let log = BuildLog::new(settings.logs_dir.clone());
        Self {
            store,
            git,
            containers,
            builder,
            settings,
            log,
            locks: SiteLocks::new(),
        }
    }

    pub fn locks(&self) -> &SiteLocks {
        &self.locks
    }

    pub fn build_log_path(&self, site: &SiteName) -> Option<PathBuf> {
        self.log.path(site)
    }

    /// Working tree for a site.
    pub fn work_path(&self, site: &Site) -> PathBuf {
        self.settings.sites_root.join(site.name.as_str())
    }

    fn deps(&self) -> Deps<'_> {
        Deps {
            store: self.store.as_ref(),
            git: self.git.as_ref(),
            containers: self.containers.as_ref(),
            builder: self.builder.as_ref(),
            log: &self.log,
        }
    }

    /// Deploy the site's branch head.
    ///
    /// Only a missing site, or a store failure before the deployment row
    /// exists, is returned as an error. Every later failure is recorded on
    /// the deployment and reported through the outcome.
    pub async fn deploy(&self, site_id: SiteId) -> Result<DeployOutcome, DeployError> {
        self.store
            .site(site_id)
            .await?
            .ok_or(DeployError::SiteNotFound(site_id))?;

        let lock = self.locks.acquire(site_id).await;

        // Re-read under the lock: a deploy we waited on may have moved the site
        let site = self
            .store
            .site(site_id)
            .await?
            .ok_or(DeployError::SiteNotFound(site_id))?;

        let inspection = self.has_running_container(&site).await;
        let deployment = self
            .store
            .insert_deployment(site.id, site.container_id.clone(), site.port)
            .await?;
        lock.record_deployment(deployment.id);

        let has_existing = match inspection {
            Ok(running) => running,
            Err(e) => {
                self.record_failure(deployment.id, &site, None, &e).await;
                return Ok(DeployOutcome {
                    success: false,
                    deployment_id: deployment.id,
                    error: Some(e.to_string()),
                });
            }
        };

        tracing::info!(
            site = %site.name,
            deployment = %deployment.id,
            blue_green = has_existing,
            "deploy started"
        );

        // What the site row should say if the pipeline is interrupted
        let mut fallback = site.clone();
        fallback.status = if has_existing {
            SiteStatus::Running
        } else {
            SiteStatus::Error
        };

        let result = self
            .run_pipeline(deployment.id, &site, has_existing, &mut fallback)
            .await;
        drop(lock);

        match result {
            Ok(DeploymentStatus::Completed) => {
                tracing::info!(site = %site.name, deployment = %deployment.id, "deploy completed");
                Ok(DeployOutcome {
                    success: true,
                    deployment_id: deployment.id,
                    error: None,
                })
            }
            Ok(status) => {
                let error = self
                    .store
                    .deployment(deployment.id)
                    .await
                    .ok()
                    .flatten()
                    .and_then(|d| d.error)
                    .unwrap_or_else(|| format!("deployment ended {status}"));
                tracing::warn!(site = %site.name, deployment = %deployment.id, %status, "deploy did not complete");
                Ok(DeployOutcome {
                    success: false,
                    deployment_id: deployment.id,
                    error: Some(error),
                })
            }
            Err(e) => {
                self.record_failure(deployment.id, &site, Some(&fallback), &e)
                    .await;
                Ok(DeployOutcome {
                    success: false,
                    deployment_id: deployment.id,
                    error: Some(e.to_string()),
                })
            }
        }
    }

    /// Whether the recorded container is serving.
    ///
    /// Inspection errors are returned, never read as "nothing running".
    async fn has_running_container(&self, site: &Site) -> Result<bool, DeployError> {
        let Some(container_id) = site.container_id.as_deref() else {
            return Ok(false);
        };
        self.containers
            .is_container_running(container_id)
            .await
            .map_err(|e| DeployError::InspectFailed(e.to_string()))
    }

    /// Run every step. Returns the terminal status when the pipeline itself
    /// closed the deployment, or the error that interrupted it.
    ///
    /// Once traffic has moved, `fallback` is replaced by the site as served
    /// by the new container.
    async fn run_pipeline(
        &self,
        deployment_id: DeploymentId,
        site: &Site,
        has_existing: bool,
        fallback: &mut Site,
    ) -> Result<DeploymentStatus, DeployError> {
        let deps = self.deps();

        if !has_existing {
            let mut building = site.clone();
            building.status = SiteStatus::Building;
            self.store.update_site(&building).await?;
        }

        let started = Pipeline::new(deployment_id, site.clone(), self.work_path(site), has_existing)
            .fetch_source(deps)
            .await?
            .build_image(deps)
            .await?
            .start_container(deps)
            .await?;

        let healthy = match started.health_check(deps).await {
            Ok(healthy) => healthy,
            Err((started, reason)) => {
                tracing::warn!(
                    site = %site.name,
                    deployment = %deployment_id,
                    error = %reason,
                    "new container unhealthy"
                );
                return started.rollback(deps, &reason).await;
            }
        };

        let switched = healthy.switch(deps).await?;
        *fallback = switched.serving_site();
        switched.finish(deps).await?;
        Ok(DeploymentStatus::Completed)
    }

    /// Close a deployment interrupted by an error and write `restore` back
    /// as the site row. `None` leaves the row untouched.
    async fn record_failure(
        &self,
        deployment_id: DeploymentId,
        site: &Site,
        restore: Option<&Site>,
        error: &DeployError,
    ) {
        let message = error.to_string();
        tracing::error!(site = %site.name, deployment = %deployment_id, error = %message, "deploy failed");
        self.log
            .append(&site.name, deployment_id, &format!("deploy failed: {message}"))
            .await;

        match self
            .store
            .update_deployment_status(deployment_id, DeploymentStatus::Failed, Some(message))
            .await
        {
            Ok(_) | Err(StoreError::InvalidTransition { .. }) => {}
            Err(e) => {
                tracing::error!(deployment = %deployment_id, error = %e, "failed to record deploy failure");
            }
        }

        if let Some(restored) = restore
            && let Err(e) = self.store.update_site(restored).await
        {
            tracing::error!(site = %site.name, error = %e, "failed to restore site status");
        }
    }

    /// Stop a site's container and mark it stopped.
    pub async fn stop(&self, site_id: SiteId) -> Result<(), DeployError> {
        let mut site = self
            .store
            .site(site_id)
            .await?
            .ok_or(DeployError::SiteNotFound(site_id))?;

        if let Some(container_id) = site.container_id.as_deref() {
            self.containers
                .stop_container(container_id)
                .await
                .map_err(|e| DeployError::StopFailed(e.to_string()))?;
        }

        site.status = SiteStatus::Stopped;
        self.store.update_site(&site).await?;
        tracing::info!(site = %site.name, "site stopped");
        Ok(())
    }

    pub async fn deployment(&self, id: DeploymentId) -> Result<Deployment, DeployError> {
        self.store
            .deployment(id)
            .await?
            .ok_or(DeployError::DeploymentNotFound(id))
    }

    /// Deployments of a site, oldest first.
    pub async fn deployments(&self, site_id: SiteId) -> Result<Vec<Deployment>, DeployError> {
        Ok(self.store.deployments_for_site(site_id).await?)
    }
}
