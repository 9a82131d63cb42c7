// ABOUTME: Config scaffolding for new installations.
// ABOUTME: Creates slipway.yml template files.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::SiteName;

use super::{CONFIG_FILENAME, Config};

pub fn init_config(
    dir: &Path,
    site: Option<&str>,
    repo: Option<&str>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = Config::template()?;

    if let Some(s) = site {
        config.sites.head.name =
            SiteName::new(s).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    if let Some(r) = repo {
        config.sites.head.repo = r.to_string();
    }

    let yaml = generate_template_yaml(&config);
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(config: &Config) -> String {
    let site = config.sites.first();
    format!(
        r#"paths:
  sites_root: {}
  logs_dir: {}
  state_file: {}

proxy:
  domain: {}
  scheme: {}
  # Routes file watched by the reverse proxy
  # routes_file: /etc/slipway/routes.json

sessions:
  max_per_user: {}
  expiration: 3h
  cleanup_interval: 5m

sites:
  - name: {}
    repo: {}
    branch: {}
    # env:
    #   DATABASE_URL: {{ env: SITE_DATABASE_URL }}
"#,
        config.paths.sites_root.display(),
        config.paths.logs_dir.display(),
        config.paths.state_file.display(),
        config.proxy.domain,
        config.proxy.scheme,
        config.sessions.max_per_user,
        site.name,
        site.repo,
        site.branch,
    )
}
