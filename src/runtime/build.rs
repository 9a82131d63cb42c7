// ABOUTME: Image build step for site working trees.
// ABOUTME: BuildPipeline trait plus a CLI builder that runs `docker build`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::error::BuildError;
use crate::types::SiteName;

/// Result of one image build. A failed build still carries its log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub success: bool,
    pub image: String,
    pub log: String,
    pub error: Option<String>,
}

/// Builds a container image from a site's working tree.
#[async_trait]
pub trait BuildPipeline: Send + Sync {
    async fn build(
        &self,
        site: &SiteName,
        path: &Path,
        tag: &str,
    ) -> Result<BuildOutput, BuildError>;
}

/// Builds images by shelling out to a Docker-compatible CLI.
#[derive(Debug, Clone)]
pub struct CliBuilder {
    program: PathBuf,
}

impl Default for CliBuilder {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl CliBuilder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

pub(crate) fn has_dockerfile(path: &Path) -> bool {
    path.join("Dockerfile").is_file()
}

#[async_trait]
impl BuildPipeline for CliBuilder {
    async fn build(
        &self,
        site: &SiteName,
        path: &Path,
        tag: &str,
    ) -> Result<BuildOutput, BuildError> {
        if !has_dockerfile(path) {
            return Err(BuildError::NoDockerfile(path.to_path_buf()));
        }

        tracing::info!(site = %site, tag, "building image");

        let output = Command::new(&self.program)
            .arg("build")
            .arg("-t")
            .arg(tag)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| BuildError::Spawn {
                site: site.to_string(),
                source,
            })?;

        let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
        log.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            tracing::info!(site = %site, tag, "image built");
            Ok(BuildOutput {
                success: true,
                image: tag.to_string(),
                log,
                error: None,
            })
        } else {
            tracing::warn!(site = %site, code = ?output.status.code(), "image build failed");
            Ok(BuildOutput {
                success: false,
                image: tag.to_string(),
                error: Some(format!(
                    "build exited with status {}",
                    output
                        .status
                        .code()
                        .map_or_else(|| "unknown".to_string(), |c| c.to_string())
                )),
                log,
            })
        }
    }
}
