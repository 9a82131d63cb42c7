// ABOUTME: SessionManager: create, commit, promote, cancel, and tear down editing sessions.
// ABOUTME: Teardown is best-effort; each step is bounded and reported, never raised.

use std::fmt::Display;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use super::cleanup::{CleanupReport, TeardownOutcome, TeardownStep};
use super::error::SessionError;
use super::naming::{preview_container_name, preview_port, preview_url};
use super::scheduler::SchedulerHandle;
use super::{CommitOptions, CreateSession, PromoteOutcome, SessionSettings, SweepReport};
use crate::git::{CommitInfo, DEFAULT_COMMIT_MESSAGE, GitOps};
use crate::proxy::{ProxyRoutes, preview_host};
use crate::runtime::{Containers, PreviewSpec, PreviewStrategy};
use crate::store::{BranchCommit, EditingSession, NewSession, SessionStatus, Store};
use crate::types::{SessionId, SiteName, UserId};

/// Owns the lifecycle of editing sessions and their preview resources.
pub struct SessionManager {
    store: Arc<dyn Store>,
    git: Arc<dyn GitOps>,
    containers: Arc<dyn Containers>,
    proxy: Arc<dyn ProxyRoutes>,
    pub(super) settings: SessionSettings,
    pub(super) scheduler: Mutex<Option<SchedulerHandle>>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn Store>,
        git: Arc<dyn GitOps>,
        containers: Arc<dyn Containers>,
        proxy: Arc<dyn ProxyRoutes>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store,
            git,
            containers,
            proxy,
            settings,
            scheduler: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Open a session, or return the user's existing active session on the site.
    ///
    /// Evicts the user's least recently active sessions to stay within the
    /// per-user cap. If the preview cannot be started the half-built session
    /// is torn down and the error returned.
    pub async fn create_session(
        &self,
        request: CreateSession,
    ) -> Result<EditingSession, SessionError> {
        if let Some(existing) = self
            .store
            .active_session(request.user_id, &request.site_name)
            .await?
        {
            tracing::debug!(session = %existing.id, user = %request.user_id, "reusing active session");
            return Ok(existing);
        }

        self.enforce_session_cap(request.user_id).await;

        let base_name = request
            .base_name
            .as_deref()
            .unwrap_or(&self.settings.default_branch_base);
        let branch = self
            .git
            .create_edit_branch(&request.site_path, base_name)
            .await?;

        let base_commit = match self.git.current_commit(&request.site_path).await {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!(branch = %branch, error = %e, "could not read base commit");
                None
            }
        };

        let now = Utc::now();
        let lifetime = match request.expiration_minutes {
            Some(minutes) => chrono::Duration::minutes(i64::from(minutes)),
            None => chrono::Duration::from_std(self.settings.expiration)
                .unwrap_or_else(|_| chrono::Duration::weeks(5200)),
        };

        let mut session = self
            .store
            .insert_session(NewSession {
                user_id: request.user_id,
                site_name: request.site_name,
                site_path: request.site_path,
                branch_name: branch,
                mode: request.mode,
                created_at: now,
                base_commit,
                expires_at: Some(now + lifetime),
                auto_cleanup: request.auto_cleanup,
            })
            .await?;

        tracing::info!(
            session = %session.id,
            user = %session.user_id,
            site = %session.site_name,
            branch = %session.branch_name,
            "session created"
        );

        if let Err(e) = self.start_preview(&mut session).await {
            tracing::warn!(session = %session.id, error = %e, "preview failed, tearing down session");
            self.cleanup_session(session.id).await;
            return Err(e);
        }

        Ok(session)
    }

    async fn enforce_session_cap(&self, user_id: UserId) {
        let active = match self.store.active_sessions_for_user(user_id).await {
            Ok(active) => active,
            Err(e) => {
                tracing::warn!(user = %user_id, error = %e, "could not count active sessions");
                return;
            }
        };

        let max = self.settings.max_sessions_per_user.max(1);
        if active.len() < max {
            return;
        }

        let excess = active.len() + 1 - max;
        for session in active.iter().take(excess) {
            tracing::info!(session = %session.id, user = %user_id, "evicting least recently active session");
            self.cleanup_session(session.id).await;
        }
    }

    /// Build and run the preview, then record it and register its route.
    async fn start_preview(&self, session: &mut EditingSession) -> Result<(), SessionError> {
        let port = preview_port(self.settings.preview_base_port, session.id).ok_or_else(|| {
            SessionError::Preview(format!("no preview port for session {}", session.id))
        })?;

        self.git
            .checkout_branch(&session.site_path, &session.branch_name)
            .await?;

        let spec = PreviewSpec {
            container_name: preview_container_name(&session.site_name, &session.branch_name),
            site: session.site_name.clone(),
            path: session.site_path.clone(),
            port,
            branch: session.branch_name.clone(),
        };

        let preview = self
            .containers
            .create_container(&spec, session.mode)
            .await
            .map_err(|e| SessionError::Preview(e.to_string()))?;

        let Some(preview) = preview else {
            tracing::info!(session = %session.id, site = %session.site_name, "nothing to preview");
            return Ok(());
        };

        let host = preview_host(&session.branch_name, &session.site_name, &self.settings.domain);
        session.container_name = Some(preview.name.clone());
        session.preview_port = Some(preview.port);
        session.preview_url = Some(preview_url(&self.settings.scheme, &host));

        // The row is the only record of the container; without it no teardown finds it
        if let Err(e) = self.store.update_session(session).await {
            let (container, image) = self.teardown_preview(&preview.name).await;
            tracing::warn!(
                session = %session.id,
                container = %preview.name,
                error = %e,
                ?container,
                ?image,
                "could not record preview, removed it"
            );
            session.container_name = None;
            session.preview_port = None;
            session.preview_url = None;
            return Err(e.into());
        }

        if let Err(e) = self
            .proxy
            .add_preview_route(session.id, &session.site_name, &session.branch_name, preview.port)
            .await
        {
            tracing::warn!(session = %session.id, error = %e, "could not register preview route");
        }

        tracing::info!(
            session = %session.id,
            port = preview.port,
            url = session.preview_url.as_deref().unwrap_or_default(),
            "preview started"
        );
        Ok(())
    }

    pub async fn get_session(&self, id: SessionId) -> Result<Option<EditingSession>, SessionError> {
        Ok(self.store.session(id).await?)
    }

    pub async fn get_active_session(
        &self,
        user_id: UserId,
        site_name: &SiteName,
    ) -> Result<Option<EditingSession>, SessionError> {
        Ok(self.store.active_session(user_id, site_name).await?)
    }

    async fn require(&self, id: SessionId) -> Result<EditingSession, SessionError> {
        self.store
            .session(id)
            .await?
            .ok_or(SessionError::NotFound(id))
    }

    pub async fn update_activity(&self, id: SessionId) -> Result<(), SessionError> {
        let mut session = self.require(id).await?;
        session.last_activity = Utc::now();
        self.store.update_session(&session).await?;
        Ok(())
    }

    /// Commit the working tree on the session branch.
    ///
    /// Returns the new commit hash, or an empty string when there was
    /// nothing to commit; in that case the session is left untouched.
    pub async fn commit_session(
        &self,
        id: SessionId,
        site_path: &Path,
        options: CommitOptions,
    ) -> Result<String, SessionError> {
        let mut session = self.require(id).await?;

        self.git
            .checkout_branch(site_path, &session.branch_name)
            .await?;

        let files_changed = match self.git.get_status(site_path).await {
            Ok(status) => status.changes.len(),
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "could not read working tree status");
                0
            }
        };

        let message = options
            .message
            .unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_string());
        let hash = self.git.commit_changes(site_path, Some(&message)).await?;
        if hash.is_empty() {
            tracing::debug!(session = %id, "nothing to commit");
            return Ok(hash);
        }

        let now = Utc::now();
        session.commits_count += 1;
        session.last_commit = Some(now);
        session.last_save = Some(now);
        session.last_activity = now;
        session.current_commit = Some(hash.clone());
        self.store.update_session(&session).await?;

        self.store
            .insert_branch_commit(BranchCommit {
                session_id: id,
                branch_name: session.branch_name.clone(),
                commit_hash: hash.clone(),
                message,
                author: options
                    .author
                    .unwrap_or_else(|| format!("user-{}", session.user_id)),
                files_changed,
                committed_at: now,
            })
            .await?;

        tracing::info!(session = %id, commit = %hash, files = files_changed, "session committed");
        Ok(hash)
    }

    /// Merge the session branch into main and tear the session down.
    ///
    /// A failed merge leaves the session in `failed` with its branch intact.
    pub async fn deploy_session(
        &self,
        id: SessionId,
        site_path: &Path,
    ) -> Result<PromoteOutcome, SessionError> {
        let mut session = self.require(id).await?;
        session.status = SessionStatus::Deploying;
        session.last_activity = Utc::now();
        self.store.update_session(&session).await?;

        if let Err(e) = self
            .git
            .merge_branch_to_main(site_path, &session.branch_name)
            .await
        {
            session.status = SessionStatus::Failed;
            if let Err(store_err) = self.store.update_session(&session).await {
                tracing::error!(session = %id, error = %store_err, "could not mark session failed");
            }
            tracing::warn!(session = %id, branch = %session.branch_name, error = %e, "merge failed");
            return Err(SessionError::PromoteFailed {
                session: id,
                message: e.to_string(),
            });
        }

        tracing::info!(session = %id, branch = %session.branch_name, "session merged to main");
        let cleanup = self.cleanup_session(id).await;
        Ok(PromoteOutcome {
            session_id: id,
            branch: session.branch_name,
            cleanup,
        })
    }

    /// Abandon a session and tear it down, deleting its branch.
    pub async fn cancel_session(
        &self,
        id: SessionId,
        site_path: &Path,
    ) -> Result<CleanupReport, SessionError> {
        let mut session = self.require(id).await?;
        session.status = SessionStatus::Inactive;
        session.site_path = site_path.to_path_buf();
        self.store.update_session(&session).await?;

        tracing::info!(session = %id, "session cancelled");
        Ok(self.cleanup_session(id).await)
    }

    async fn bounded<T, E, F>(&self, step: F) -> Result<T, String>
    where
        E: Display,
        F: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.settings.teardown_timeout, step).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "timed out after {:?}",
                self.settings.teardown_timeout
            )),
        }
    }

    /// Release every resource a session holds. Never fails.
    ///
    /// Steps run in order: proxy route, container, image, branch, record.
    /// A session that is being promoted keeps its branch. Cleaning up a
    /// session that is already gone reports every step as skipped.
    pub async fn cleanup_session(&self, id: SessionId) -> CleanupReport {
        let mut report = CleanupReport::new(id);

        let session = match self.store.session(id).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "could not load session for teardown");
                None
            }
        };

        let route = match self.bounded(self.proxy.remove_preview_route(id)).await {
            Ok(true) => TeardownOutcome::Done,
            Ok(false) => TeardownOutcome::Skipped,
            Err(message) => TeardownOutcome::Failed(message),
        };
        report.record(TeardownStep::ProxyRoute, route);

        let Some(session) = session else {
            for step in [
                TeardownStep::Container,
                TeardownStep::Image,
                TeardownStep::Branch,
                TeardownStep::Record,
            ] {
                report.record(step, TeardownOutcome::Skipped);
            }
            return report;
        };

        let (container, image) = match session.container_name.as_deref() {
            Some(name) => self.teardown_preview(name).await,
            None => (TeardownOutcome::Skipped, TeardownOutcome::Skipped),
        };
        report.record(TeardownStep::Container, container);
        report.record(TeardownStep::Image, image);

        let branch = if session.status == SessionStatus::Deploying {
            TeardownOutcome::Skipped
        } else {
            match self
                .bounded(
                    self.git
                        .delete_branch(&session.site_path, &session.branch_name, true),
                )
                .await
            {
                Ok(()) => TeardownOutcome::Done,
                Err(message) => TeardownOutcome::Failed(message),
            }
        };
        report.record(TeardownStep::Branch, branch);

        let record = match self.bounded(self.store.delete_session(id)).await {
            Ok(true) => TeardownOutcome::Done,
            Ok(false) => TeardownOutcome::Skipped,
            Err(message) => TeardownOutcome::Failed(message),
        };
        report.record(TeardownStep::Record, record);

        tracing::info!(
            session = %id,
            clean = report.is_clean(),
            "session torn down"
        );
        report
    }

    /// Stop the preview; remove its container and image when it runs as a container.
    async fn teardown_preview(&self, name: &str) -> (TeardownOutcome, TeardownOutcome) {
        let record = match self.bounded(self.containers.get_container(name)).await {
            Ok(Some(record)) => record,
            Ok(None) => return (TeardownOutcome::Skipped, TeardownOutcome::Skipped),
            Err(message) => {
                let container = match self.bounded(self.containers.stop_container(name)).await {
                    Ok(()) => TeardownOutcome::Done,
                    Err(stop) => TeardownOutcome::Failed(format!("{message}; {stop}")),
                };
                return (container, TeardownOutcome::Skipped);
            }
        };

        if let Err(message) = self.bounded(self.containers.stop_container(name)).await {
            return (TeardownOutcome::Failed(message), TeardownOutcome::Skipped);
        }

        if record.strategy != PreviewStrategy::Container {
            return (TeardownOutcome::Done, TeardownOutcome::Skipped);
        }

        let container = match self
            .bounded(self.containers.remove_container(name, true))
            .await
        {
            Ok(()) => TeardownOutcome::Done,
            Err(message) => TeardownOutcome::Failed(message),
        };
        let image = match self
            .bounded(self.containers.remove_image(&record.image))
            .await
        {
            Ok(()) => TeardownOutcome::Done,
            Err(message) => TeardownOutcome::Failed(message),
        };
        (container, image)
    }

    /// Stop the preview if it is running and start it again.
    ///
    /// Failures are logged; returns whether a fresh preview is up.
    pub async fn restart_preview_container(&self, id: SessionId) -> bool {
        let mut session = match self.store.session(id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::warn!(session = %id, "cannot restart preview of unknown session");
                return false;
            }
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "could not load session");
                return false;
            }
        };

        if let Some(name) = session.container_name.clone() {
            match self.containers.is_container_running(&name).await {
                Ok(true) => {
                    if let Err(e) = self.containers.stop_container(&name).await {
                        tracing::warn!(session = %id, container = %name, error = %e, "could not stop preview");
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(session = %id, container = %name, error = %e, "could not inspect preview");
                }
            }
            tokio::time::sleep(self.settings.restart_delay).await;
        }

        match self.start_preview(&mut session).await {
            Ok(()) => session.container_name.is_some(),
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "preview restart failed");
                false
            }
        }
    }

    /// Log of the session branch, newest first.
    pub async fn commit_history(
        &self,
        id: SessionId,
        limit: usize,
    ) -> Result<Vec<CommitInfo>, SessionError> {
        let session = self.require(id).await?;
        self.git
            .checkout_branch(&session.site_path, &session.branch_name)
            .await?;
        Ok(self
            .git
            .get_commit_history(&session.site_path, limit)
            .await?)
    }

    /// Commits recorded through `commit_session`, oldest first.
    pub async fn branch_commits(&self, id: SessionId) -> Result<Vec<BranchCommit>, SessionError> {
        Ok(self.store.branch_commits(id).await?)
    }

    /// Tear down every expired auto-cleanup session and prune stale routes.
    pub async fn sweep_expired(&self) -> SweepReport {
        let expired = match self.store.expired_sessions(Utc::now()).await {
            Ok(expired) => expired,
            Err(e) => {
                tracing::warn!(error = %e, "could not list expired sessions");
                Vec::new()
            }
        };

        let expired =
            futures::future::join_all(expired.iter().map(|s| self.cleanup_session(s.id))).await;

        let routes_removed = match self.bounded(self.proxy.cleanup_expired_routes()).await {
            Ok(removed) => removed,
            Err(message) => {
                tracing::warn!(error = %message, "could not prune expired routes");
                0
            }
        };

        if !expired.is_empty() || routes_removed > 0 {
            tracing::info!(
                sessions = expired.len(),
                routes = routes_removed,
                "expired sessions swept"
            );
        }
        SweepReport {
            expired,
            routes_removed,
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.scheduler.get_mut().take() {
            handle.cancel();
        }
    }
}
