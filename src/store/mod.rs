// ABOUTME: Persistence collaborator: the single source of truth for cross-call state.
// ABOUTME: Defines the Store trait plus in-memory and JSON-file implementations.

mod error;
mod file;
mod memory;
mod records;
mod tables;

pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use records::{
    BranchCommit, Deployment, DeploymentStatus, EditingSession, NewSession, NewSite,
    SessionMode, SessionStatus, Site, SiteAction, SiteStatus,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{DeploymentId, SessionId, SiteId, SiteName, UserId};

/// Keyed reads and writes over sites, deployments, sessions, and audit rows.
///
/// Every call is a suspension point for the caller. Implementations assign
/// auto-increment ids on insert for deployments and sessions.
#[async_trait]
pub trait Store: Send + Sync {
    async fn site(&self, id: SiteId) -> Result<Option<Site>, StoreError>;

    async fn site_by_name(&self, name: &SiteName) -> Result<Option<Site>, StoreError>;

    async fn sites(&self) -> Result<Vec<Site>, StoreError>;

    async fn insert_site(&self, site: NewSite) -> Result<Site, StoreError>;

    /// Replace a site row. Fails with `SiteNotFound` if the row is gone.
    async fn update_site(&self, site: &Site) -> Result<(), StoreError>;

    /// Open a new deployment in `Pending` for the given site.
    async fn insert_deployment(
        &self,
        site_id: SiteId,
        previous_container_id: Option<String>,
        previous_port: Option<u16>,
    ) -> Result<Deployment, StoreError>;

    async fn deployment(&self, id: DeploymentId) -> Result<Option<Deployment>, StoreError>;

    async fn deployments_for_site(&self, site_id: SiteId) -> Result<Vec<Deployment>, StoreError>;

    /// Move a deployment forward. Backward moves and changes to terminal
    /// records fail with `InvalidTransition`.
    async fn update_deployment_status(
        &self,
        id: DeploymentId,
        status: DeploymentStatus,
        error: Option<String>,
    ) -> Result<Deployment, StoreError>;

    async fn insert_session(&self, session: NewSession) -> Result<EditingSession, StoreError>;

    async fn session(&self, id: SessionId) -> Result<Option<EditingSession>, StoreError>;

    /// The most recently created active session for a user on a site.
    async fn active_session(
        &self,
        user_id: UserId,
        site_name: &SiteName,
    ) -> Result<Option<EditingSession>, StoreError>;

    /// All active sessions of a user, least recently active first.
    async fn active_sessions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<EditingSession>, StoreError>;

    async fn update_session(&self, session: &EditingSession) -> Result<(), StoreError>;

    /// Delete a session row. Returns whether a row was removed.
    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError>;

    /// Sessions with auto-cleanup set, an expiry before `now`, and status
    /// active or inactive.
    async fn expired_sessions(&self, now: DateTime<Utc>)
    -> Result<Vec<EditingSession>, StoreError>;

    async fn insert_branch_commit(&self, commit: BranchCommit) -> Result<(), StoreError>;

    async fn branch_commits(&self, session_id: SessionId) -> Result<Vec<BranchCommit>, StoreError>;

    /// Drop every action of a site and insert the given set.
    async fn replace_site_actions(
        &self,
        site_id: SiteId,
        actions: Vec<SiteAction>,
    ) -> Result<(), StoreError>;

    async fn site_actions(&self, site_id: SiteId) -> Result<Vec<SiteAction>, StoreError>;
}
