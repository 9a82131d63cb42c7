// ABOUTME: Test support utilities.
// ABOUTME: In-memory fakes of the git, container, build, and store collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use slipway::git::{CommitInfo, FileChange, GitError, GitOps, RepoStatus};
use slipway::runtime::{
    BuildError, BuildOutput, BuildPipeline, ContainerError, ContainerRecord, Containers,
    PreviewContainer, PreviewSpec, PreviewStrategy, StartOptions, StartedContainer, next_name,
    preview_image, serving_name,
};
use chrono::{DateTime, Utc};
use slipway::store::{
    BranchCommit, Deployment, DeploymentStatus, EditingSession, MemoryStore, NewSession, NewSite,
    SessionMode, Site, SiteAction, Store, StoreError,
};
use slipway::types::{BranchName, DeploymentId, SessionId, SiteId, SiteName, UserId};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Once};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("slipway=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn rejected(command: &str) -> GitError {
    GitError::CommandFailed {
        command: command.to_string(),
        stderr: "simulated failure".to_string(),
    }
}

fn hash(n: u32) -> String {
    format!("{n:040x}")
}

#[derive(Debug, Default)]
pub struct GitState {
    pub branches: BTreeSet<String>,
    pub checked_out: Option<String>,
    /// Uncommitted files in the working tree.
    pub pending_changes: usize,
    pub commits: u32,
    pub merged: Vec<String>,
    pub pulls: usize,
    next_branch: u32,
    pub fail_clone: bool,
    pub fail_merge: bool,
    pub fail_delete: bool,
}

/// Git double: tracks branches and commits without touching disk.
#[derive(Debug, Default)]
pub struct FakeGit {
    state: Mutex<GitState>,
}

impl FakeGit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut GitState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub fn has_branch(&self, branch: &BranchName) -> bool {
        self.state.lock().branches.contains(branch.as_str())
    }
}

#[async_trait]
impl GitOps for FakeGit {
    async fn clone_or_pull(
        &self,
        _remote: &str,
        _branch: &str,
        _path: &Path,
    ) -> Result<(), GitError> {
        let mut state = self.state.lock();
        if state.fail_clone {
            return Err(rejected("clone"));
        }
        state.pulls += 1;
        Ok(())
    }

    async fn create_edit_branch(
        &self,
        _path: &Path,
        base_name: &str,
    ) -> Result<BranchName, GitError> {
        let mut state = self.state.lock();
        state.next_branch += 1;
        let name = format!("{base_name}-{:04}", state.next_branch);
        let branch = BranchName::new(&name).map_err(|source| GitError::InvalidBranch { source })?;
        state.branches.insert(name.clone());
        state.checked_out = Some(name);
        Ok(branch)
    }

    async fn checkout_branch(&self, _path: &Path, branch: &BranchName) -> Result<(), GitError> {
        let mut state = self.state.lock();
        if !state.branches.contains(branch.as_str()) {
            return Err(rejected("checkout"));
        }
        state.checked_out = Some(branch.to_string());
        Ok(())
    }

    async fn commit_changes(
        &self,
        _path: &Path,
        _message: Option<&str>,
    ) -> Result<String, GitError> {
        let mut state = self.state.lock();
        if state.pending_changes == 0 {
            return Ok(String::new());
        }
        state.pending_changes = 0;
        state.commits += 1;
        Ok(hash(state.commits))
    }

    async fn merge_branch_to_main(
        &self,
        _path: &Path,
        branch: &BranchName,
    ) -> Result<(), GitError> {
        let mut state = self.state.lock();
        if state.fail_merge {
            return Err(rejected("merge"));
        }
        state.merged.push(branch.to_string());
        state.checked_out = Some("main".to_string());
        Ok(())
    }

    async fn delete_branch(
        &self,
        _path: &Path,
        branch: &BranchName,
        _force: bool,
    ) -> Result<(), GitError> {
        let mut state = self.state.lock();
        if state.fail_delete {
            return Err(rejected("branch"));
        }
        state.branches.remove(branch.as_str());
        Ok(())
    }

    async fn get_status(&self, _path: &Path) -> Result<RepoStatus, GitError> {
        let state = self.state.lock();
        Ok(RepoStatus {
            branch: state.checked_out.clone().unwrap_or_else(|| "main".to_string()),
            changes: (0..state.pending_changes)
                .map(|i| FileChange {
                    status: " M".to_string(),
                    path: format!("page-{i}.html"),
                })
                .collect(),
        })
    }

    async fn current_commit(&self, _path: &Path) -> Result<String, GitError> {
        Ok(hash(self.state.lock().commits))
    }

    async fn get_commit_history(
        &self,
        _path: &Path,
        limit: usize,
    ) -> Result<Vec<CommitInfo>, GitError> {
        let commits = self.state.lock().commits;
        Ok((1..=commits)
            .rev()
            .take(limit)
            .map(|n| CommitInfo {
                hash: hash(n),
                author: "Test Author".to_string(),
                date: None,
                message: format!("commit {n}"),
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub image: String,
    pub port: u16,
    pub running: bool,
    pub strategy: PreviewStrategy,
}

#[derive(Debug)]
pub struct ContainerState {
    /// Containers by name.
    pub containers: BTreeMap<String, FakeContainer>,
    pub images: BTreeSet<String>,
    pub healthy: bool,
    pub preview_fails: bool,
    /// Previews report nothing runnable, as for a tree without a Dockerfile.
    pub nothing_to_preview: bool,
    pub fail_stop: bool,
    pub fail_inspect: bool,
    pub next_id: u32,
    pub next_port: u16,
    pub calls: Vec<String>,
}

impl Default for ContainerState {
    fn default() -> Self {
        Self {
            containers: BTreeMap::new(),
            images: BTreeSet::new(),
            healthy: true,
            preview_fails: false,
            nothing_to_preview: false,
            fail_stop: false,
            fail_inspect: false,
            next_id: 0,
            next_port: 4000,
            calls: Vec::new(),
        }
    }
}

impl ContainerState {
    /// Name of the container with this name or id.
    fn resolve(&self, key: &str) -> Option<String> {
        if self.containers.contains_key(key) {
            return Some(key.to_string());
        }
        self.containers
            .iter()
            .find(|(_, c)| c.id == key)
            .map(|(name, _)| name.clone())
    }
}

/// Container runtime double keyed by container name.
#[derive(Debug, Default)]
pub struct FakeContainers {
    state: Mutex<ContainerState>,
}

impl FakeContainers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut ContainerState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.state.lock().containers.get(name).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }
}

#[async_trait]
impl Containers for FakeContainers {
    async fn create_container(
        &self,
        spec: &PreviewSpec,
        _mode: SessionMode,
    ) -> Result<Option<PreviewContainer>, ContainerError> {
        let mut state = self.state.lock();
        state.calls.push(format!("preview {}", spec.container_name));
        if state.preview_fails {
            return Err(ContainerError::Runtime("simulated preview failure".to_string()));
        }
        if state.nothing_to_preview {
            return Ok(None);
        }

        state.next_id += 1;
        let image = preview_image(&spec.container_name);
        let container = FakeContainer {
            id: format!("ctr-{}", state.next_id),
            image: image.clone(),
            port: spec.port,
            running: true,
            strategy: PreviewStrategy::Container,
        };
        state.images.insert(image);
        state
            .containers
            .insert(spec.container_name.clone(), container);
        Ok(Some(PreviewContainer {
            name: spec.container_name.clone(),
            port: spec.port,
        }))
    }

    async fn stop_container(&self, name: &str) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        state.calls.push(format!("stop {name}"));
        if state.fail_stop {
            return Err(ContainerError::Runtime("simulated stop failure".to_string()));
        }
        if let Some(key) = state.resolve(name)
            && let Some(container) = state.containers.get_mut(&key)
        {
            container.running = false;
        }
        Ok(())
    }

    async fn remove_container(&self, name: &str, _force: bool) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        state.calls.push(format!("remove {name}"));
        if let Some(key) = state.resolve(name) {
            state.containers.remove(&key);
        }
        Ok(())
    }

    async fn remove_image(&self, image: &str) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        state.calls.push(format!("remove-image {image}"));
        state.images.remove(image);
        Ok(())
    }

    async fn is_container_running(&self, name: &str) -> Result<bool, ContainerError> {
        let state = self.state.lock();
        if state.fail_inspect {
            return Err(ContainerError::Runtime("simulated inspect failure".to_string()));
        }
        Ok(state
            .resolve(name)
            .and_then(|key| state.containers.get(&key))
            .is_some_and(|c| c.running))
    }

    async fn get_container(&self, name: &str) -> Result<Option<ContainerRecord>, ContainerError> {
        let state = self.state.lock();
        Ok(state.containers.get(name).map(|c| ContainerRecord {
            name: name.to_string(),
            image: c.image.clone(),
            strategy: c.strategy,
            running: c.running,
        }))
    }

    async fn start_container(
        &self,
        image: &str,
        site: &SiteName,
        options: &StartOptions,
    ) -> Result<StartedContainer, ContainerError> {
        let mut state = self.state.lock();
        let name = if options.blue_green {
            next_name(site)
        } else {
            serving_name(site)
        };
        state.calls.push(format!("start {name}"));

        state.next_id += 1;
        let port = state.next_port;
        state.next_port += 1;
        let id = format!("ctr-{}", state.next_id);
        state.containers.insert(
            name,
            FakeContainer {
                id: id.clone(),
                image: image.to_string(),
                port,
                running: true,
                strategy: PreviewStrategy::Container,
            },
        );

        Ok(StartedContainer {
            container_id: id,
            port,
            is_blue_green: options.blue_green,
        })
    }

    async fn wait_for_container_health(&self, _port: u16) -> Result<bool, ContainerError> {
        Ok(self.state.lock().healthy)
    }

    async fn complete_blue_green(&self, site: &SiteName) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        state.calls.push(format!("complete {site}"));
        let Some(next) = state.containers.remove(&next_name(site)) else {
            return Err(ContainerError::NoPendingSwitch(site.to_string()));
        };
        state.containers.insert(serving_name(site), next);
        Ok(())
    }

    async fn rollback_blue_green(&self, site: &SiteName) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        state.calls.push(format!("rollback {site}"));
        state.containers.remove(&next_name(site));
        Ok(())
    }
}

/// Builder double that succeeds unless told to fail.
#[derive(Debug, Default)]
pub struct FakeBuilder {
    fail: Mutex<bool>,
    builds: Mutex<Vec<String>>,
}

impl FakeBuilder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_builds(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn builds(&self) -> Vec<String> {
        self.builds.lock().clone()
    }
}

#[async_trait]
impl BuildPipeline for FakeBuilder {
    async fn build(
        &self,
        _site: &SiteName,
        _path: &Path,
        tag: &str,
    ) -> Result<BuildOutput, BuildError> {
        self.builds.lock().push(tag.to_string());
        let fail = *self.fail.lock();
        Ok(BuildOutput {
            success: !fail,
            image: tag.to_string(),
            log: format!("Step 1/1 : FROM scratch\nSuccessfully tagged {tag}"),
            error: fail.then(|| "simulated build failure".to_string()),
        })
    }
}

/// Writes a [`FlakyStore`] refuses.
#[derive(Debug, Default)]
pub struct StoreFaults {
    pub fail_replace_actions: bool,
    /// Refuse closing a deployment as `Completed`.
    pub fail_complete: bool,
    pub fail_update_session: bool,
}

fn write_refused() -> StoreError {
    StoreError::Io(std::io::Error::other("simulated write failure"))
}

/// MemoryStore wrapper that fails selected writes.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    faults: Mutex<StoreFaults>,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn faults<R>(&self, f: impl FnOnce(&mut StoreFaults) -> R) -> R {
        f(&mut self.faults.lock())
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn site(&self, id: SiteId) -> Result<Option<Site>, StoreError> {
        self.inner.site(id).await
    }

    async fn site_by_name(&self, name: &SiteName) -> Result<Option<Site>, StoreError> {
        self.inner.site_by_name(name).await
    }

    async fn sites(&self) -> Result<Vec<Site>, StoreError> {
        self.inner.sites().await
    }

    async fn insert_site(&self, site: NewSite) -> Result<Site, StoreError> {
        self.inner.insert_site(site).await
    }

    async fn update_site(&self, site: &Site) -> Result<(), StoreError> {
        self.inner.update_site(site).await
    }

    async fn insert_deployment(
        &self,
        site_id: SiteId,
        previous_container_id: Option<String>,
        previous_port: Option<u16>,
    ) -> Result<Deployment, StoreError> {
        self.inner
            .insert_deployment(site_id, previous_container_id, previous_port)
            .await
    }

    async fn deployment(&self, id: DeploymentId) -> Result<Option<Deployment>, StoreError> {
        self.inner.deployment(id).await
    }

    async fn deployments_for_site(&self, site_id: SiteId) -> Result<Vec<Deployment>, StoreError> {
        self.inner.deployments_for_site(site_id).await
    }

    async fn update_deployment_status(
        &self,
        id: DeploymentId,
        status: DeploymentStatus,
        error: Option<String>,
    ) -> Result<Deployment, StoreError> {
        if status == DeploymentStatus::Completed && self.faults.lock().fail_complete {
            return Err(write_refused());
        }
        self.inner.update_deployment_status(id, status, error).await
    }

    async fn insert_session(&self, session: NewSession) -> Result<EditingSession, StoreError> {
        self.inner.insert_session(session).await
    }

    async fn session(&self, id: SessionId) -> Result<Option<EditingSession>, StoreError> {
        self.inner.session(id).await
    }

    async fn active_session(
        &self,
        user_id: UserId,
        site_name: &SiteName,
    ) -> Result<Option<EditingSession>, StoreError> {
        self.inner.active_session(user_id, site_name).await
    }

    async fn active_sessions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<EditingSession>, StoreError> {
        self.inner.active_sessions_for_user(user_id).await
    }

    async fn update_session(&self, session: &EditingSession) -> Result<(), StoreError> {
        if self.faults.lock().fail_update_session {
            return Err(write_refused());
        }
        self.inner.update_session(session).await
    }

    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
        self.inner.delete_session(id).await
    }

    async fn expired_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<EditingSession>, StoreError> {
        self.inner.expired_sessions(now).await
    }

    async fn insert_branch_commit(&self, commit: BranchCommit) -> Result<(), StoreError> {
        self.inner.insert_branch_commit(commit).await
    }

    async fn branch_commits(&self, session_id: SessionId) -> Result<Vec<BranchCommit>, StoreError> {
        self.inner.branch_commits(session_id).await
    }

    async fn replace_site_actions(
        &self,
        site_id: SiteId,
        actions: Vec<SiteAction>,
    ) -> Result<(), StoreError> {
        if self.faults.lock().fail_replace_actions {
            return Err(write_refused());
        }
        self.inner.replace_site_actions(site_id, actions).await
    }

    async fn site_actions(&self, site_id: SiteId) -> Result<Vec<SiteAction>, StoreError> {
        self.inner.site_actions(site_id).await
    }
}
