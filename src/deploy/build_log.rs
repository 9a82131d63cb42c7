// ABOUTME: Per-site build log written alongside tracing output.
// ABOUTME: Appends timestamped lines to <logs_dir>/<site>.log; write failures only warn.

use chrono::Utc;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::types::{DeploymentId, SiteName};

/// Appends deployment progress to one log file per site.
#[derive(Debug, Clone, Default)]
pub struct BuildLog {
    dir: Option<PathBuf>,
}

impl BuildLog {
    /// A log rooted at `dir`; `None` disables file output.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn path(&self, site: &SiteName) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("{site}.log")))
    }

    /// Append one or more lines tagged with the deployment id.
    pub async fn append(&self, site: &SiteName, deployment: DeploymentId, text: &str) {
        let Some(path) = self.path(site) else {
            return;
        };

        let stamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        let mut entry = String::new();
        for line in text.lines() {
            entry.push_str(&format!("[{stamp}] [deployment {deployment}] {line}\n"));
        }

        if let Err(e) = write(&path, entry.as_bytes()).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to write build log");
        }
    }
}

async fn write(path: &std::path::Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await
}
