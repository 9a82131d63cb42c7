// ABOUTME: Durable record types for sites, deployments, sessions, and commits.
// ABOUTME: Status enums carry the transition rules the store enforces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::config::EnvValue;
use crate::types::{BranchName, DeploymentId, SessionId, SiteId, SiteName, UserId};

/// Lifecycle status of a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteStatus {
    Stopped,
    Building,
    Running,
    Error,
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SiteStatus::Stopped => "stopped",
            SiteStatus::Building => "building",
            SiteStatus::Running => "running",
            SiteStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// A deployable site backed by a git repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub name: SiteName,
    pub repo_url: String,
    pub branch: String,
    pub container_id: Option<String>,
    pub port: Option<u16>,
    pub status: SiteStatus,
    pub persistent_storage: bool,
    pub env_vars: BTreeMap<String, EnvValue>,
    pub last_deployed_at: Option<DateTime<Utc>>,
}

/// Fields supplied when registering a site.
#[derive(Debug, Clone)]
pub struct NewSite {
    pub name: SiteName,
    pub repo_url: String,
    pub branch: String,
    pub persistent_storage: bool,
    pub env_vars: BTreeMap<String, EnvValue>,
}

/// Status of one deployment attempt.
///
/// The happy path runs `Pending → Cloning → Building → Starting → Healthy →
/// Switching → Completed`. `Failed` and `RolledBack` are reachable from any
/// non-terminal state. Terminal records never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Cloning,
    Building,
    Starting,
    Healthy,
    Switching,
    Completed,
    Failed,
    RolledBack,
}

impl DeploymentStatus {
    fn rank(self) -> u8 {
        match self {
            DeploymentStatus::Pending => 0,
            DeploymentStatus::Cloning => 1,
            DeploymentStatus::Building => 2,
            DeploymentStatus::Starting => 3,
            DeploymentStatus::Healthy => 4,
            DeploymentStatus::Switching => 5,
            DeploymentStatus::Completed
            | DeploymentStatus::Failed
            | DeploymentStatus::RolledBack => 6,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentStatus::Completed | DeploymentStatus::Failed | DeploymentStatus::RolledBack
        )
    }

    /// Whether a record in this status may move to `next`.
    pub fn can_transition_to(self, next: DeploymentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            DeploymentStatus::Failed | DeploymentStatus::RolledBack => true,
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Cloning => "cloning",
            DeploymentStatus::Building => "building",
            DeploymentStatus::Starting => "starting",
            DeploymentStatus::Healthy => "healthy",
            DeploymentStatus::Switching => "switching",
            DeploymentStatus::Completed => "completed",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

/// One attempt to (re)deploy a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub site_id: SiteId,
    pub status: DeploymentStatus,
    pub previous_container_id: Option<String>,
    pub previous_port: Option<u16>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Status of an editing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Inactive,
    Deploying,
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Active => "active",
            SessionStatus::Inactive => "inactive",
            SessionStatus::Deploying => "deploying",
            SessionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Whether the preview is editable or read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Edit,
    Preview,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Edit => f.write_str("edit"),
            SessionMode::Preview => f.write_str("preview"),
        }
    }
}

/// An ephemeral per-user preview environment on its own branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditingSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub site_name: SiteName,
    pub site_path: PathBuf,
    pub branch_name: BranchName,
    pub container_name: Option<String>,
    pub status: SessionStatus,
    pub mode: SessionMode,
    pub preview_port: Option<u16>,
    pub preview_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub last_save: Option<DateTime<Utc>>,
    pub last_commit: Option<DateTime<Utc>>,
    pub base_commit: Option<String>,
    pub current_commit: Option<String>,
    pub commits_count: u32,
    pub expires_at: Option<DateTime<Utc>>,
    pub auto_cleanup: bool,
}

impl EditingSession {
    /// Whether the expiration sweep should tear this session down at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.auto_cleanup
            && matches!(self.status, SessionStatus::Active | SessionStatus::Inactive)
            && self.expires_at.is_some_and(|at| at < now)
    }
}

/// Fields supplied when inserting a session; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: UserId,
    pub site_name: SiteName,
    pub site_path: PathBuf,
    pub branch_name: BranchName,
    pub mode: SessionMode,
    pub created_at: DateTime<Utc>,
    pub base_commit: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub auto_cleanup: bool,
}

/// Audit row for one commit made inside a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCommit {
    pub session_id: SessionId,
    pub branch_name: BranchName,
    pub commit_hash: String,
    pub message: String,
    pub author: String,
    pub files_changed: usize,
    pub committed_at: DateTime<Utc>,
}

/// Automation discovered in a site's working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteAction {
    pub site_id: SiteId,
    pub name: String,
    pub path: PathBuf,
    pub description: Option<String>,
}
