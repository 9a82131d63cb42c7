// ABOUTME: Git collaborator: branch, commit, and merge primitives over a working tree.
// ABOUTME: Defines the GitOps trait and its git-CLI implementation.

mod cli;
mod error;

pub use cli::{DEFAULT_COMMIT_MESSAGE, GitCli};
pub use error::{GitError, GitErrorKind};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::path::Path;

use crate::types::BranchName;

/// One changed path in the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Two-letter porcelain status, e.g. ` M` or `??`.
    pub status: String,
    pub path: String,
}

/// Working tree status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepoStatus {
    pub branch: String,
    pub changes: Vec<FileChange>,
}

impl RepoStatus {
    pub fn is_clean(&self) -> bool {
        self.changes.is_empty()
    }
}

/// One entry of `git log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    pub author: String,
    pub date: Option<DateTime<FixedOffset>>,
    pub message: String,
}

/// Git operations used by deployments and editing sessions.
#[async_trait]
pub trait GitOps: Send + Sync {
    /// Clone `remote` at `branch` into `path`, or fast-forward an existing clone.
    async fn clone_or_pull(&self, remote: &str, branch: &str, path: &Path)
    -> Result<(), GitError>;

    /// Create and check out a new uniquely named branch derived from `base_name`.
    async fn create_edit_branch(
        &self,
        path: &Path,
        base_name: &str,
    ) -> Result<BranchName, GitError>;

    async fn checkout_branch(&self, path: &Path, branch: &BranchName) -> Result<(), GitError>;

    /// Stage and commit every change. Returns an empty string when there was
    /// nothing to commit.
    async fn commit_changes(&self, path: &Path, message: Option<&str>)
    -> Result<String, GitError>;

    async fn merge_branch_to_main(&self, path: &Path, branch: &BranchName)
    -> Result<(), GitError>;

    /// Delete a local branch. A branch that no longer exists is not an error.
    async fn delete_branch(
        &self,
        path: &Path,
        branch: &BranchName,
        force: bool,
    ) -> Result<(), GitError>;

    async fn get_status(&self, path: &Path) -> Result<RepoStatus, GitError>;

    /// Hash of `HEAD`.
    async fn current_commit(&self, path: &Path) -> Result<String, GitError>;

    /// Most recent commits first.
    async fn get_commit_history(
        &self,
        path: &Path,
        limit: usize,
    ) -> Result<Vec<CommitInfo>, GitError>;
}
