// ABOUTME: Git collaborator error types with SNAFU pattern.
// ABOUTME: Separates spawn failures from non-zero git exits for programmatic handling.

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum GitError {
    #[snafu(display("failed to run git {command}: {source}"))]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("failed to prepare {}: {source}", path.display()))]
    Workspace {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("git {command} failed: {stderr}"))]
    CommandFailed { command: String, stderr: String },

    #[snafu(display("unexpected git output: {message}"))]
    UnexpectedOutput { message: String },

    #[snafu(display("invalid branch name produced: {source}"))]
    InvalidBranch {
        source: crate::types::BranchNameError,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitErrorKind {
    /// The git binary could not be launched.
    Unavailable,
    /// Git ran and reported failure.
    Rejected,
    /// Git output could not be interpreted.
    Protocol,
}

impl GitError {
    pub fn kind(&self) -> GitErrorKind {
        match self {
            GitError::Spawn { .. } | GitError::Workspace { .. } => GitErrorKind::Unavailable,
            GitError::CommandFailed { .. } => GitErrorKind::Rejected,
            GitError::UnexpectedOutput { .. } | GitError::InvalidBranch { .. } => {
                GitErrorKind::Protocol
            }
        }
    }
}
