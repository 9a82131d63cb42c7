// ABOUTME: Synchronous table logic shared by the memory and file stores.
// ABOUTME: Owns auto-increment counters and enforces deployment transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::StoreError;
use super::records::{
    BranchCommit, Deployment, DeploymentStatus, EditingSession, NewSession, NewSite, Site,
    SessionStatus, SiteAction, SiteStatus,
};
use crate::types::{DeploymentId, SessionId, SiteId, SiteName, UserId};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct Tables {
    next_site: i64,
    next_deployment: i64,
    next_session: i64,
    sites: Vec<Site>,
    deployments: Vec<Deployment>,
    sessions: Vec<EditingSession>,
    commits: Vec<BranchCommit>,
    actions: Vec<SiteAction>,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

impl Tables {
    pub(crate) fn site(&self, id: SiteId) -> Option<Site> {
        self.sites.iter().find(|s| s.id == id).cloned()
    }

    pub(crate) fn site_by_name(&self, name: &SiteName) -> Option<Site> {
        self.sites.iter().find(|s| &s.name == name).cloned()
    }

    pub(crate) fn sites(&self) -> Vec<Site> {
        self.sites.clone()
    }

    pub(crate) fn insert_site(&mut self, new: NewSite) -> Result<Site, StoreError> {
        if self.sites.iter().any(|s| s.name == new.name) {
            return Err(StoreError::DuplicateSite(new.name.to_string()));
        }
        let site = Site {
            id: SiteId::new(next_id(&mut self.next_site)),
            name: new.name,
            repo_url: new.repo_url,
            branch: new.branch,
            container_id: None,
            port: None,
            status: SiteStatus::Stopped,
            persistent_storage: new.persistent_storage,
            env_vars: new.env_vars,
            last_deployed_at: None,
        };
        self.sites.push(site.clone());
        Ok(site)
    }

    pub(crate) fn update_site(&mut self, site: &Site) -> Result<(), StoreError> {
        let row = self
            .sites
            .iter_mut()
            .find(|s| s.id == site.id)
            .ok_or(StoreError::SiteNotFound(site.id))?;
        *row = site.clone();
        Ok(())
    }

    pub(crate) fn insert_deployment(
        &mut self,
        site_id: SiteId,
        previous_container_id: Option<String>,
        previous_port: Option<u16>,
        now: DateTime<Utc>,
    ) -> Result<Deployment, StoreError> {
        if !self.sites.iter().any(|s| s.id == site_id) {
            return Err(StoreError::SiteNotFound(site_id));
        }
        let deployment = Deployment {
            id: DeploymentId::new(next_id(&mut self.next_deployment)),
            site_id,
            status: DeploymentStatus::Pending,
            previous_container_id,
            previous_port,
            started_at: now,
            completed_at: None,
            error: None,
        };
        self.deployments.push(deployment.clone());
        Ok(deployment)
    }

    pub(crate) fn deployment(&self, id: DeploymentId) -> Option<Deployment> {
        self.deployments.iter().find(|d| d.id == id).cloned()
    }

    pub(crate) fn deployments_for_site(&self, site_id: SiteId) -> Vec<Deployment> {
        self.deployments
            .iter()
            .filter(|d| d.site_id == site_id)
            .cloned()
            .collect()
    }

    pub(crate) fn update_deployment_status(
        &mut self,
        id: DeploymentId,
        status: DeploymentStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Deployment, StoreError> {
        let row = self
            .deployments
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(StoreError::DeploymentNotFound(id))?;

        if !row.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id,
                from: row.status,
                to: status,
            });
        }

        row.status = status;
        if error.is_some() {
            row.error = error;
        }
        if status.is_terminal() {
            row.completed_at = Some(now);
        }
        Ok(row.clone())
    }

    pub(crate) fn insert_session(&mut self, new: NewSession) -> EditingSession {
        let session = EditingSession {
            id: SessionId::new(next_id(&mut self.next_session)),
            user_id: new.user_id,
            site_name: new.site_name,
            site_path: new.site_path,
            branch_name: new.branch_name,
            container_name: None,
            status: SessionStatus::Active,
            mode: new.mode,
            preview_port: None,
            preview_url: None,
            created_at: new.created_at,
            last_activity: new.created_at,
            last_save: None,
            last_commit: None,
            current_commit: new.base_commit.clone(),
            base_commit: new.base_commit,
            commits_count: 0,
            expires_at: new.expires_at,
            auto_cleanup: new.auto_cleanup,
        };
        self.sessions.push(session.clone());
        session
    }

    pub(crate) fn session(&self, id: SessionId) -> Option<EditingSession> {
        self.sessions.iter().find(|s| s.id == id).cloned()
    }

    pub(crate) fn active_session(
        &self,
        user_id: UserId,
        site_name: &SiteName,
    ) -> Option<EditingSession> {
        self.sessions
            .iter()
            .filter(|s| {
                s.user_id == user_id
                    && &s.site_name == site_name
                    && s.status == SessionStatus::Active
            })
            .max_by_key(|s| (s.created_at, s.id))
            .cloned()
    }

    pub(crate) fn active_sessions_for_user(&self, user_id: UserId) -> Vec<EditingSession> {
        let mut sessions: Vec<EditingSession> = self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.status == SessionStatus::Active)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.last_activity, s.id));
        sessions
    }

    pub(crate) fn update_session(&mut self, session: &EditingSession) -> Result<(), StoreError> {
        let row = self
            .sessions
            .iter_mut()
            .find(|s| s.id == session.id)
            .ok_or(StoreError::SessionNotFound(session.id))?;
        *row = session.clone();
        Ok(())
    }

    pub(crate) fn delete_session(&mut self, id: SessionId) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        self.sessions.len() != before
    }

    pub(crate) fn expired_sessions(&self, now: DateTime<Utc>) -> Vec<EditingSession> {
        self.sessions
            .iter()
            .filter(|s| s.is_expired(now))
            .cloned()
            .collect()
    }

    pub(crate) fn insert_branch_commit(&mut self, commit: BranchCommit) {
        self.commits.push(commit);
    }

    pub(crate) fn branch_commits(&self, session_id: SessionId) -> Vec<BranchCommit> {
        self.commits
            .iter()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect()
    }

    pub(crate) fn replace_site_actions(&mut self, site_id: SiteId, actions: Vec<SiteAction>) {
        self.actions.retain(|a| a.site_id != site_id);
        self.actions.extend(actions);
    }

    pub(crate) fn site_actions(&self, site_id: SiteId) -> Vec<SiteAction> {
        self.actions
            .iter()
            .filter(|a| a.site_id == site_id)
            .cloned()
            .collect()
    }
}
