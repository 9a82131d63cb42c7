// ABOUTME: Deterministic names, ports, and URLs for session previews.
// ABOUTME: Preview URLs use one subdomain level so a single wildcard certificate covers them.

use crate::types::{BranchName, SessionId, SiteName};

pub fn preview_container_name(site: &SiteName, branch: &BranchName) -> String {
    format!("slipway-preview-{}-{}", site, branch.dns_label())
}

/// Preview host port: the base offset plus the session id.
///
/// `None` when the sum falls outside the port range.
pub fn preview_port(base: u16, session_id: SessionId) -> Option<u16> {
    i64::from(base)
        .checked_add(session_id.get())
        .and_then(|port| u16::try_from(port).ok())
}

pub fn preview_url(scheme: &str, host: &str) -> String {
    format!("{scheme}://{host}")
}
