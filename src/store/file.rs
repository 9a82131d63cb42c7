// ABOUTME: JSON-snapshot Store implementation for the CLI.
// ABOUTME: Keeps tables in memory and rewrites the state file after every mutation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

use super::tables::Tables;
use super::{
    BranchCommit, Deployment, DeploymentStatus, EditingSession, NewSession, NewSite, Site,
    SiteAction, Store, StoreError,
};
use crate::types::{DeploymentId, SessionId, SiteId, SiteName, UserId};

/// A Store persisted as a single JSON document.
///
/// Writes go to a sibling temp file and are renamed into place, so a crash
/// mid-write leaves the previous snapshot intact.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    tables: Mutex<Tables>,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    /// Open the state file, starting empty if it does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let tables = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            tables: Mutex::new(tables),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn mutate<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Tables) -> Result<T, StoreError> + Send,
        T: Send,
    {
        // Serializes snapshot writes so they land in mutation order
        let _guard = self.write_lock.lock().await;

        // Mutate a copy; readers see the change only once it is on disk
        let mut staged = self.tables.lock().clone();
        let value = f(&mut staged)?;
        let snapshot = serde_json::to_vec_pretty(&staged)?;

        self.persist(&snapshot).await?;
        *self.tables.lock() = staged;
        Ok(value)
    }

    async fn persist(&self, snapshot: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, snapshot).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for FileStore {
    async fn site(&self, id: SiteId) -> Result<Option<Site>, StoreError> {
        Ok(self.tables.lock().site(id))
    }

    async fn site_by_name(&self, name: &SiteName) -> Result<Option<Site>, StoreError> {
        Ok(self.tables.lock().site_by_name(name))
    }

    async fn sites(&self) -> Result<Vec<Site>, StoreError> {
        Ok(self.tables.lock().sites())
    }

    async fn insert_site(&self, site: NewSite) -> Result<Site, StoreError> {
        self.mutate(|t| t.insert_site(site)).await
    }

    async fn update_site(&self, site: &Site) -> Result<(), StoreError> {
        self.mutate(|t| t.update_site(site)).await
    }

    async fn insert_deployment(
        &self,
        site_id: SiteId,
        previous_container_id: Option<String>,
        previous_port: Option<u16>,
    ) -> Result<Deployment, StoreError> {
        let now = Utc::now();
        self.mutate(|t| t.insert_deployment(site_id, previous_container_id, previous_port, now))
            .await
    }

    async fn deployment(&self, id: DeploymentId) -> Result<Option<Deployment>, StoreError> {
        Ok(self.tables.lock().deployment(id))
    }

    async fn deployments_for_site(&self, site_id: SiteId) -> Result<Vec<Deployment>, StoreError> {
        Ok(self.tables.lock().deployments_for_site(site_id))
    }

    async fn update_deployment_status(
        &self,
        id: DeploymentId,
        status: DeploymentStatus,
        error: Option<String>,
    ) -> Result<Deployment, StoreError> {
        let now = Utc::now();
        self.mutate(|t| t.update_deployment_status(id, status, error, now))
            .await
    }

    async fn insert_session(&self, session: NewSession) -> Result<EditingSession, StoreError> {
        self.mutate(|t| Ok(t.insert_session(session))).await
    }

    async fn session(&self, id: SessionId) -> Result<Option<EditingSession>, StoreError> {
        Ok(self.tables.lock().session(id))
    }

    async fn active_session(
        &self,
        user_id: UserId,
        site_name: &SiteName,
    ) -> Result<Option<EditingSession>, StoreError> {
        Ok(self.tables.lock().active_session(user_id, site_name))
    }

    async fn active_sessions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<EditingSession>, StoreError> {
        Ok(self.tables.lock().active_sessions_for_user(user_id))
    }

    async fn update_session(&self, session: &EditingSession) -> Result<(), StoreError> {
        self.mutate(|t| t.update_session(session)).await
    }

    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
        self.mutate(|t| Ok(t.delete_session(id))).await
    }

    async fn expired_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<EditingSession>, StoreError> {
        Ok(self.tables.lock().expired_sessions(now))
    }

    async fn insert_branch_commit(&self, commit: BranchCommit) -> Result<(), StoreError> {
        self.mutate(|t| {
            t.insert_branch_commit(commit);
            Ok(())
        })
        .await
    }

    async fn branch_commits(&self, session_id: SessionId) -> Result<Vec<BranchCommit>, StoreError> {
        Ok(self.tables.lock().branch_commits(session_id))
    }

    async fn replace_site_actions(
        &self,
        site_id: SiteId,
        actions: Vec<SiteAction>,
    ) -> Result<(), StoreError> {
        self.mutate(|t| {
            t.replace_site_actions(site_id, actions);
            Ok(())
        })
        .await
    }

    async fn site_actions(&self, site_id: SiteId) -> Result<Vec<SiteAction>, StoreError> {
        Ok(self.tables.lock().site_actions(site_id))
    }
}
