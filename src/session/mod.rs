// ABOUTME: Ephemeral editing sessions: a branch, a preview, and a route per user edit.
// ABOUTME: Exports the SessionManager, its settings, and teardown reporting.

mod cleanup;
mod error;
mod manager;
mod naming;
mod scheduler;

pub use cleanup::{CleanupReport, TeardownOutcome, TeardownStep};
pub use error::{SessionError, SessionErrorKind};
pub use manager::SessionManager;
pub use naming::{preview_container_name, preview_port, preview_url};

use std::path::PathBuf;
use std::time::Duration;

use crate::store::SessionMode;
use crate::types::{BranchName, SessionId, SiteName, UserId};

/// Tunables for session lifecycle and previews.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Active sessions a user may hold before the least recently active is evicted.
    pub max_sessions_per_user: usize,
    pub expiration: Duration,
    pub cleanup_interval: Duration,
    /// Preview ports are this base plus the session id.
    pub preview_base_port: u16,
    pub domain: String,
    pub scheme: String,
    pub default_branch_base: String,
    /// Pause between stopping and recreating a preview.
    pub restart_delay: Duration,
    /// Upper bound for each individual teardown step.
    pub teardown_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            max_sessions_per_user: 3,
            expiration: Duration::from_secs(180 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
            preview_base_port: 5000,
            domain: "localhost".to_string(),
            scheme: "https".to_string(),
            default_branch_base: "edit".to_string(),
            restart_delay: Duration::from_secs(1),
            teardown_timeout: Duration::from_secs(30),
        }
    }
}

/// Request to open an editing session.
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub user_id: UserId,
    pub site_name: SiteName,
    pub site_path: PathBuf,
    /// Branch name stem; the settings default when `None`.
    pub base_name: Option<String>,
    /// Lifetime override in minutes.
    pub expiration_minutes: Option<u32>,
    pub mode: SessionMode,
    pub auto_cleanup: bool,
}

impl CreateSession {
    pub fn new(user_id: UserId, site_name: SiteName, site_path: impl Into<PathBuf>) -> Self {
        CreateSession {
            user_id,
            site_name,
            site_path: site_path.into(),
            base_name: None,
            expiration_minutes: None,
            mode: SessionMode::Edit,
            auto_cleanup: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    pub message: Option<String>,
    pub author: Option<String>,
}

/// Result of merging a session into the main branch.
#[derive(Debug, Clone)]
pub struct PromoteOutcome {
    pub session_id: SessionId,
    pub branch: BranchName,
    pub cleanup: CleanupReport,
}

/// Result of one expiration sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub expired: Vec<CleanupReport>,
    pub routes_removed: usize,
}
