// ABOUTME: GitOps implementation that shells out to the git binary.
// ABOUTME: Each call runs one or more git subcommands inside the working tree.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use snafu::{ResultExt, ensure};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::error::{
    CommandFailedSnafu, InvalidBranchSnafu, SpawnSnafu, UnexpectedOutputSnafu, WorkspaceSnafu,
};
use super::{CommitInfo, FileChange, GitError, GitOps, RepoStatus};
use crate::types::BranchName;

pub const DEFAULT_COMMIT_MESSAGE: &str = "Save changes from editing session";

/// Per-tree git config key naming the branch a clone tracks.
const MAIN_BRANCH_KEY: &str = "slipway.mainbranch";

// Field and record separators for `git log --format`
const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';

/// Runs the `git` binary found on `PATH` (or an explicit program path).
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
    main_branch: String,
    env: HashMap<String, String>,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
            main_branch: "main".to_string(),
            env: HashMap::new(),
        }
    }

    /// Branch that promotions merge into when the working tree does not
    /// record its own.
    pub fn with_main_branch(mut self, branch: impl Into<String>) -> Self {
        self.main_branch = branch.into();
        self
    }

    /// Author and committer identity for commits made by this client.
    pub fn with_identity(mut self, name: &str, email: &str) -> Self {
        for role in ["AUTHOR", "COMMITTER"] {
            self.env.insert(format!("GIT_{role}_NAME"), name.to_string());
            self.env.insert(format!("GIT_{role}_EMAIL"), email.to_string());
        }
        self
    }

    pub fn main_branch(&self) -> &str {
        &self.main_branch
    }

    async fn run<I, S>(&self, dir: Option<&Path>, args: I) -> Result<String, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let command = args
            .first()
            .map(|a| a.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut cmd = Command::new(&self.program);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        let output = cmd
            .args(&args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context(SpawnSnafu {
                command: command.clone(),
            })?;

        ensure!(
            output.status.success(),
            CommandFailedSnafu {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
        );

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn branch_exists(&self, path: &Path, branch: &str) -> Result<bool, GitError> {
        let reference = format!("refs/heads/{branch}");
        match self
            .run(Some(path), ["show-ref", "--verify", "--quiet", reference.as_str()])
            .await
        {
            Ok(_) => Ok(true),
            Err(GitError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The branch this tree was cloned or last pulled from, else the default.
    async fn main_branch_for(&self, path: &Path) -> String {
        match self
            .run(Some(path), ["config", "--get", MAIN_BRANCH_KEY])
            .await
        {
            Ok(out) if !out.trim().is_empty() => out.trim().to_string(),
            _ => self.main_branch.clone(),
        }
    }

    async fn remember_main_branch(&self, path: &Path, branch: &str) -> Result<(), GitError> {
        self.run(Some(path), ["config", MAIN_BRANCH_KEY, branch])
            .await?;
        Ok(())
    }

    async fn current_branch(&self, path: &Path) -> Result<String, GitError> {
        let out = self
            .run(Some(path), ["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        Ok(out.trim().to_string())
    }
}

#[async_trait]
impl GitOps for GitCli {
    async fn clone_or_pull(
        &self,
        remote: &str,
        branch: &str,
        path: &Path,
    ) -> Result<(), GitError> {
        if path.join(".git").exists() {
            tracing::debug!(path = %path.display(), branch, "pulling existing clone");
            self.run(Some(path), ["fetch", "origin", branch]).await?;
            self.run(Some(path), ["checkout", branch]).await?;
            self.run(Some(path), ["merge", "--ff-only", "FETCH_HEAD"])
                .await?;
            return self.remember_main_branch(path, branch).await;
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .context(WorkspaceSnafu { path: parent })?;
        }

        tracing::debug!(remote, branch, path = %path.display(), "cloning repository");
        self.run(
            None,
            [
                OsStr::new("clone"),
                OsStr::new("--branch"),
                OsStr::new(branch),
                OsStr::new(remote),
                path.as_os_str(),
            ],
        )
        .await?;
        self.remember_main_branch(path, branch).await
    }

    async fn create_edit_branch(
        &self,
        path: &Path,
        base_name: &str,
    ) -> Result<BranchName, GitError> {
        let name = edit_branch_name(base_name, Utc::now());
        let branch = BranchName::new(&name).context(InvalidBranchSnafu)?;
        self.run(Some(path), ["checkout", "-b", branch.as_str()])
            .await?;
        Ok(branch)
    }

    async fn checkout_branch(&self, path: &Path, branch: &BranchName) -> Result<(), GitError> {
        self.run(Some(path), ["checkout", branch.as_str()]).await?;
        Ok(())
    }

    async fn commit_changes(
        &self,
        path: &Path,
        message: Option<&str>,
    ) -> Result<String, GitError> {
        self.run(Some(path), ["add", "-A"]).await?;

        let staged = self.run(Some(path), ["status", "--porcelain"]).await?;
        if staged.trim().is_empty() {
            return Ok(String::new());
        }

        let message = message.unwrap_or(DEFAULT_COMMIT_MESSAGE);
        self.run(Some(path), ["commit", "-m", message]).await?;
        self.current_commit(path).await
    }

    async fn merge_branch_to_main(
        &self,
        path: &Path,
        branch: &BranchName,
    ) -> Result<(), GitError> {
        let main = self.main_branch_for(path).await;
        self.run(Some(path), ["checkout", main.as_str()]).await?;

        let message = format!("Merge {branch} into {main}");
        let merged = self
            .run(
                Some(path),
                ["merge", "--no-ff", "-m", message.as_str(), branch.as_str()],
            )
            .await;

        if merged.is_err()
            && let Err(e) = self.run(Some(path), ["merge", "--abort"]).await
        {
            tracing::warn!(error = %e, "failed to abort merge");
        }

        merged.map(|_| ())
    }

    async fn delete_branch(
        &self,
        path: &Path,
        branch: &BranchName,
        force: bool,
    ) -> Result<(), GitError> {
        if !self.branch_exists(path, branch.as_str()).await? {
            return Ok(());
        }

        if self.current_branch(path).await? == branch.as_str() {
            let main = self.main_branch_for(path).await;
            self.run(Some(path), ["checkout", main.as_str()]).await?;
        }

        let flag = if force { "-D" } else { "-d" };
        self.run(Some(path), ["branch", flag, branch.as_str()])
            .await?;
        Ok(())
    }

    async fn get_status(&self, path: &Path) -> Result<RepoStatus, GitError> {
        let branch = self.current_branch(path).await?;
        let porcelain = self.run(Some(path), ["status", "--porcelain"]).await?;
        Ok(RepoStatus {
            branch,
            changes: parse_porcelain(&porcelain),
        })
    }

    async fn current_commit(&self, path: &Path) -> Result<String, GitError> {
        let out = self.run(Some(path), ["rev-parse", "HEAD"]).await?;
        let hash = out.trim();
        ensure!(
            !hash.is_empty(),
            UnexpectedOutputSnafu {
                message: "rev-parse HEAD returned nothing",
            }
        );
        Ok(hash.to_string())
    }

    async fn get_commit_history(
        &self,
        path: &Path,
        limit: usize,
    ) -> Result<Vec<CommitInfo>, GitError> {
        let count = format!("-n{limit}");
        let format = format!("--format=%H{FIELD_SEP}%an{FIELD_SEP}%aI{FIELD_SEP}%s{RECORD_SEP}");
        let out = self
            .run(Some(path), ["log", count.as_str(), format.as_str()])
            .await?;
        parse_log(&out)
    }
}

fn edit_branch_name(base_name: &str, now: DateTime<Utc>) -> String {
    format!("{base_name}-{}", now.format("%Y%m%d-%H%M%S%3f")).to_lowercase()
}

fn parse_porcelain(output: &str) -> Vec<FileChange> {
    output
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| FileChange {
            status: line[..2].to_string(),
            path: line[3..].to_string(),
        })
        .collect()
}

fn parse_log(output: &str) -> Result<Vec<CommitInfo>, GitError> {
    output
        .split(RECORD_SEP)
        .map(str::trim)
        .filter(|record| !record.is_empty())
        .map(|record| {
            let fields: Vec<&str> = record.split(FIELD_SEP).collect();
            let [hash, author, date, message] = fields[..] else {
                return UnexpectedOutputSnafu {
                    message: format!("malformed log record: {record}"),
                }
                .fail();
            };
            Ok(CommitInfo {
                hash: hash.to_string(),
                author: author.to_string(),
                date: DateTime::parse_from_rfc3339(date).ok(),
                message: message.to_string(),
            })
        })
        .collect()
}
