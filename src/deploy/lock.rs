// ABOUTME: Per-site deploy lock so concurrent deploys of one site serialize.
// ABOUTME: Lock holders are recorded with host, pid, deployment id, and acquisition time.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

use crate::types::{DeploymentId, SiteId};

/// Information about who holds a site's deploy lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// Deployment running under the lock, once its row exists.
    pub deployment_id: Option<DeploymentId>,
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn new() -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            deployment_id: None,
            acquired_at: Utc::now(),
        }
    }
}

type Holders = Arc<Mutex<HashMap<SiteId, LockInfo>>>;

/// Advisory locks keyed by site.
#[derive(Debug, Default)]
pub struct SiteLocks {
    slots: Mutex<HashMap<SiteId, Arc<tokio::sync::Mutex<()>>>>,
    holders: Holders,
}

impl SiteLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the site's lock and hold it until the guard drops.
    pub async fn acquire(&self, site_id: SiteId) -> SiteLockGuard {
        let slot = self.slots.lock().entry(site_id).or_default().clone();

        if let Some(current) = self.holder(site_id) {
            tracing::debug!(
                site = %site_id,
                holder = %current.holder,
                deployment = ?current.deployment_id.map(|id| id.get()),
                "waiting for deploy lock"
            );
        }

        let permit = slot.lock_owned().await;
        self.holders.lock().insert(site_id, LockInfo::new());

        SiteLockGuard {
            site_id,
            holders: Arc::clone(&self.holders),
            _permit: permit,
        }
    }

    /// Current holder of a site's lock, if any.
    pub fn holder(&self, site_id: SiteId) -> Option<LockInfo> {
        self.holders.lock().get(&site_id).cloned()
    }
}

/// A held site lock that releases on drop.
#[derive(Debug)]
pub struct SiteLockGuard {
    site_id: SiteId,
    holders: Holders,
    _permit: OwnedMutexGuard<()>,
}

impl SiteLockGuard {
    /// Record the deployment running under this lock.
    pub fn record_deployment(&self, deployment_id: DeploymentId) {
        if let Some(info) = self.holders.lock().get_mut(&self.site_id) {
            info.deployment_id = Some(deployment_id);
        }
    }
}

impl Drop for SiteLockGuard {
    fn drop(&mut self) {
        self.holders.lock().remove(&self.site_id);
    }
}
