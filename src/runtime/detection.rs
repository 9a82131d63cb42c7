// ABOUTME: Locates the Docker-compatible API socket on the local host.
// ABOUTME: Honors DOCKER_HOST, then rootless Podman, rootful Podman, and Docker sockets.

use std::path::{Path, PathBuf};

use super::error::ContainerError;

const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Find a container runtime socket.
///
/// Detection order:
/// 1. `DOCKER_HOST` when it is a `unix://` URL
/// 2. Rootless Podman socket (`/run/user/$UID/podman/podman.sock`)
/// 3. Rootful Podman socket (`/run/podman/podman.sock`)
/// 4. Docker socket (`/var/run/docker.sock`)
pub fn detect_socket() -> Result<PathBuf, ContainerError> {
    let docker_host = std::env::var("DOCKER_HOST").ok();
    candidates(docker_host.as_deref(), uid().as_deref())
        .into_iter()
        .find(|p| p.exists())
        .ok_or_else(|| {
            ContainerError::Unavailable(
                "no container runtime socket found (checked DOCKER_HOST, Podman and Docker)"
                    .to_string(),
            )
        })
}

fn candidates(docker_host: Option<&str>, uid: Option<&str>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(socket) = docker_host.and_then(|h| h.strip_prefix("unix://")) {
        paths.push(PathBuf::from(socket));
    }
    if let Some(uid) = uid {
        paths.push(PathBuf::from(format!("/run/user/{uid}/podman/podman.sock")));
    }
    paths.push(Path::new(ROOTFUL_PODMAN).to_path_buf());
    paths.push(Path::new(DOCKER_SOCKET).to_path_buf());
    paths
}

fn uid() -> Option<String> {
    std::env::var("UID").ok().or_else(|| {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|s| {
                s.lines()
                    .find(|l| l.starts_with("Uid:"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .map(str::to_string)
            })
    })
}
