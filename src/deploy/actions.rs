// ABOUTME: Discovery of site-defined actions in a working tree.
// ABOUTME: Executables under .slipway/actions/ become SiteAction rows.

use std::path::Path;

use crate::store::SiteAction;
use crate::types::SiteId;

/// Directory, relative to the working tree, scanned for actions.
pub const ACTIONS_DIR: &str = ".slipway/actions";

const DESCRIPTION_PREFIX: &str = "# description:";

// Only the head of each script is scanned for a description
const DESCRIPTION_SCAN_LINES: usize = 10;

/// List the actions a site's working tree defines, sorted by name.
///
/// A missing actions directory yields an empty list.
pub async fn discover_actions(
    site_id: SiteId,
    work_path: &Path,
) -> std::io::Result<Vec<SiteAction>> {
    let dir = work_path.join(ACTIONS_DIR);
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut actions = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() || !is_executable(&metadata) {
            continue;
        }

        let path = entry.path();
        let description = tokio::fs::read_to_string(&path)
            .await
            .ok()
            .and_then(|content| description(&content));

        actions.push(SiteAction {
            site_id,
            name: entry.file_name().to_string_lossy().into_owned(),
            path,
            description,
        });
    }

    actions.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::debug!(site = %site_id, count = actions.len(), "discovered site actions");
    Ok(actions)
}

fn description(script: &str) -> Option<String> {
    script
        .lines()
        .take(DESCRIPTION_SCAN_LINES)
        .find_map(|line| line.trim().strip_prefix(DESCRIPTION_PREFIX))
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_comes_from_header_comment() {
        let script = "#!/bin/sh\n# description: Rebuild the search index\nexec reindex\n";
        assert_eq!(
            description(script).as_deref(),
            Some("Rebuild the search index")
        );
    }

    #[test]
    fn missing_description_is_none() {
        assert_eq!(description("#!/bin/sh\necho hi\n"), None);
        assert_eq!(description("# description:   \n"), None);
    }

    #[tokio::test]
    async fn missing_directory_means_no_actions() {
        let dir = tempfile::tempdir().unwrap();
        let actions = discover_actions(SiteId::new(1), dir.path()).await.unwrap();
        assert!(actions.is_empty());
    }
}
