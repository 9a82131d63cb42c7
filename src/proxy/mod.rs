// ABOUTME: Proxy route collaborator: dynamic preview routes for editing sessions.
// ABOUTME: RouteTable keeps routes in memory and mirrors them to a JSON file the proxy watches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{BranchName, SessionId, SiteName};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("failed to write routes file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read routes file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed routes file: {0}")]
    Format(#[from] serde_json::Error),
}

/// A hostname routed to a preview container's host port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewRoute {
    pub session_id: SessionId,
    pub host: String,
    pub port: u16,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PreviewRoute {
    pub fn upstream(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

/// Registers and removes the per-session routes of the reverse proxy.
#[async_trait]
pub trait ProxyRoutes: Send + Sync {
    /// Route `{branch}-{site}.{domain}` to `port`, replacing any route the
    /// session already had.
    async fn add_preview_route(
        &self,
        session_id: SessionId,
        site: &SiteName,
        branch: &BranchName,
        port: u16,
    ) -> Result<PreviewRoute, ProxyError>;

    /// Returns whether a route was removed.
    async fn remove_preview_route(&self, session_id: SessionId) -> Result<bool, ProxyError>;

    /// Drop routes past their expiry. Returns how many were dropped.
    async fn cleanup_expired_routes(&self) -> Result<usize, ProxyError>;
}

/// Preview hostname for a session branch.
///
/// Previews stay one label deep under `domain` so a single wildcard
/// certificate covers all of them.
pub fn preview_host(branch: &BranchName, site: &SiteName, domain: &str) -> String {
    format!("{}-{}.{}", branch.dns_label(), site, domain)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RoutesFile {
    routes: Vec<FileRoute>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileRoute {
    upstream: String,
    #[serde(flatten)]
    route: PreviewRoute,
}

/// In-memory route table, optionally mirrored to a routes file.
#[derive(Debug)]
pub struct RouteTable {
    domain: String,
    ttl: chrono::Duration,
    routes_file: Option<PathBuf>,
    routes: Mutex<BTreeMap<SessionId, PreviewRoute>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl RouteTable {
    /// Start empty without reading any existing routes file.
    pub fn new(domain: impl Into<String>, routes_file: Option<PathBuf>, ttl: Duration) -> Self {
        Self {
            domain: domain.into(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(5200)),
            routes_file,
            routes: Mutex::new(BTreeMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Start from the routes already in `routes_file`, if it exists.
    pub async fn load(
        domain: impl Into<String>,
        routes_file: Option<PathBuf>,
        ttl: Duration,
    ) -> Result<Self, ProxyError> {
        let table = Self::new(domain, routes_file, ttl);
        let Some(path) = table.routes_file.as_deref() else {
            return Ok(table);
        };

        let existing: RoutesFile = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RoutesFile::default(),
            Err(source) => {
                return Err(ProxyError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        {
            let mut routes = table.routes.lock();
            for entry in existing.routes {
                routes.insert(entry.route.session_id, entry.route);
            }
        }
        Ok(table)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Snapshot of every registered route.
    pub fn routes(&self) -> Vec<PreviewRoute> {
        self.routes.lock().values().cloned().collect()
    }

    pub fn route(&self, session_id: SessionId) -> Option<PreviewRoute> {
        self.routes.lock().get(&session_id).cloned()
    }

    async fn sync(&self) -> Result<(), ProxyError> {
        let Some(path) = self.routes_file.as_deref() else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        let file = RoutesFile {
            routes: self
                .routes()
                .into_iter()
                .map(|route| FileRoute {
                    upstream: route.upstream(),
                    route,
                })
                .collect(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        write_atomic(path, &bytes).await
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ProxyError> {
    let err = |source| ProxyError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(err)?;
    }

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await.map_err(err)?;
    tokio::fs::rename(&tmp, path).await.map_err(err)
}

#[async_trait]
impl ProxyRoutes for RouteTable {
    async fn add_preview_route(
        &self,
        session_id: SessionId,
        site: &SiteName,
        branch: &BranchName,
        port: u16,
    ) -> Result<PreviewRoute, ProxyError> {
        let now = Utc::now();
        let route = PreviewRoute {
            session_id,
            host: preview_host(branch, site, &self.domain),
            port,
            created_at: now,
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        self.routes.lock().insert(session_id, route.clone());
        self.sync().await?;

        tracing::debug!(session = %session_id, host = %route.host, port, "preview route added");
        Ok(route)
    }

    async fn remove_preview_route(&self, session_id: SessionId) -> Result<bool, ProxyError> {
        let removed = self.routes.lock().remove(&session_id).is_some();
        if removed {
            self.sync().await?;
            tracing::debug!(session = %session_id, "preview route removed");
        }
        Ok(removed)
    }

    async fn cleanup_expired_routes(&self) -> Result<usize, ProxyError> {
        let now = Utc::now();
        let dropped = {
            let mut routes = self.routes.lock();
            let before = routes.len();
            routes.retain(|_, route| route.expires_at > now);
            before - routes.len()
        };

        if dropped > 0 {
            self.sync().await?;
            tracing::info!(count = dropped, "expired preview routes removed");
        }
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteName {
        SiteName::new("blog").unwrap()
    }

    fn branch() -> BranchName {
        BranchName::new("edit-20260101-000000000").unwrap()
    }

    #[test]
    fn host_is_single_level_subdomain() {
        let host = preview_host(&BranchName::new("Feature/Header").unwrap(), &site(), "example.com");
        assert_eq!(host, "feature-header-blog.example.com");
    }

    #[tokio::test]
    async fn add_replaces_existing_route_for_session() {
        let table = RouteTable::new("example.com", None, Duration::from_secs(60));
        let id = SessionId::new(1);

        table.add_preview_route(id, &site(), &branch(), 5001).await.unwrap();
        table.add_preview_route(id, &site(), &branch(), 5002).await.unwrap();

        let routes = table.routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].port, 5002);
    }

    #[tokio::test]
    async fn remove_reports_whether_route_existed() {
        let table = RouteTable::new("example.com", None, Duration::from_secs(60));
        let id = SessionId::new(7);

        table.add_preview_route(id, &site(), &branch(), 5007).await.unwrap();
        assert!(table.remove_preview_route(id).await.unwrap());
        assert!(!table.remove_preview_route(id).await.unwrap());
    }

    #[tokio::test]
    async fn zero_ttl_routes_expire_on_sweep() {
        let table = RouteTable::new("example.com", None, Duration::ZERO);
        table
            .add_preview_route(SessionId::new(1), &site(), &branch(), 5001)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(table.cleanup_expired_routes().await.unwrap(), 1);
        assert!(table.routes().is_empty());
    }

    #[tokio::test]
    async fn routes_file_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy").join("routes.json");

        let table = RouteTable::new("example.com", Some(path.clone()), Duration::from_secs(60));
        table
            .add_preview_route(SessionId::new(3), &site(), &branch(), 5003)
            .await
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"upstream\": \"127.0.0.1:5003\""));

        let reloaded = RouteTable::load("example.com", Some(path), Duration::from_secs(60))
            .await
            .unwrap();
        let route = reloaded.route(SessionId::new(3)).unwrap();
        assert_eq!(route.host, "edit-20260101-000000000-blog.example.com");
    }
}
