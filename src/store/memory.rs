// ABOUTME: In-memory Store implementation.
// ABOUTME: Backs tests and short-lived processes; state is lost on drop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::tables::Tables;
use super::{
    BranchCommit, Deployment, DeploymentStatus, EditingSession, NewSession, NewSite, Site,
    SiteAction, Store, StoreError,
};
use crate::types::{DeploymentId, SessionId, SiteId, SiteName, UserId};

/// A Store that keeps every table behind one mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
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
        self.tables.lock().insert_site(site)
    }

    async fn update_site(&self, site: &Site) -> Result<(), StoreError> {
        self.tables.lock().update_site(site)
    }

    async fn insert_deployment(
        &self,
        site_id: SiteId,
        previous_container_id: Option<String>,
        previous_port: Option<u16>,
    ) -> Result<Deployment, StoreError> {
        self.tables
            .lock()
            .insert_deployment(site_id, previous_container_id, previous_port, Utc::now())
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
        self.tables
            .lock()
            .update_deployment_status(id, status, error, Utc::now())
    }

    async fn insert_session(&self, session: NewSession) -> Result<EditingSession, StoreError> {
        Ok(self.tables.lock().insert_session(session))
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
        self.tables.lock().update_session(session)
    }

    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
        Ok(self.tables.lock().delete_session(id))
    }

    async fn expired_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<EditingSession>, StoreError> {
        Ok(self.tables.lock().expired_sessions(now))
    }

    async fn insert_branch_commit(&self, commit: BranchCommit) -> Result<(), StoreError> {
        self.tables.lock().insert_branch_commit(commit);
        Ok(())
    }

    async fn branch_commits(&self, session_id: SessionId) -> Result<Vec<BranchCommit>, StoreError> {
        Ok(self.tables.lock().branch_commits(session_id))
    }

    async fn replace_site_actions(
        &self,
        site_id: SiteId,
        actions: Vec<SiteAction>,
    ) -> Result<(), StoreError> {
        self.tables.lock().replace_site_actions(site_id, actions);
        Ok(())
    }

    async fn site_actions(&self, site_id: SiteId) -> Result<Vec<SiteAction>, StoreError> {
        Ok(self.tables.lock().site_actions(site_id))
    }
}
