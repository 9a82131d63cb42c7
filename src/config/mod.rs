// ABOUTME: Configuration types and parsing for slipway.yml.
// ABOUTME: Handles YAML parsing, defaults, and conversion into service settings.

mod deserialize;
mod env_value;
mod init;

pub use env_value::{EnvValue, resolve_env_map};
pub use init::init_config;

use crate::deploy::DeploySettings;
use crate::error::{Error, Result};
use crate::runtime::ContainerSettings;
use crate::session::SessionSettings;
use crate::types::SiteName;
use deserialize::deserialize_sites;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "slipway.yml";
pub const CONFIG_FILENAME_ALT: &str = "slipway.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".slipway/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub deploy: DeployConfig,

    #[serde(default)]
    pub sessions: SessionsConfig,

    #[serde(deserialize_with = "deserialize_sites")]
    pub sites: NonEmpty<SiteConfig>,
}

/// A site as declared in config; seeded into persistence on startup.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub name: SiteName,
    pub repo: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default)]
    pub persistent_storage: bool,

    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub sites_root: PathBuf,
    pub logs_dir: PathBuf,
    pub state_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            sites_root: PathBuf::from("/var/lib/slipway/sites"),
            logs_dir: PathBuf::from("/var/log/slipway"),
            state_file: PathBuf::from("/var/lib/slipway/state.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub domain: String,
    pub scheme: String,
    pub routes_file: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub route_ttl: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            domain: "localhost".to_string(),
            scheme: "https".to_string(),
            routes_file: None,
            route_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    #[serde(with = "humantime_serde")]
    pub health_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub health_interval: Duration,
    pub health_path: String,
    #[serde(with = "humantime_serde")]
    pub stop_timeout: Duration,
    pub base_port: u16,
    pub container_port: u16,
}

impl Default for DeployConfig {
    fn default() -> Self {
        DeployConfig {
            health_timeout: Duration::from_secs(60),
            health_interval: Duration::from_secs(2),
            health_path: "/".to_string(),
            stop_timeout: Duration::from_secs(10),
            base_port: 4000,
            container_port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub max_per_user: usize,
    #[serde(with = "humantime_serde")]
    pub expiration: Duration,
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    pub preview_base_port: u16,
    pub default_branch_base: String,
    #[serde(with = "humantime_serde")]
    pub restart_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub teardown_timeout: Duration,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        let defaults = SessionSettings::default();
        SessionsConfig {
            max_per_user: defaults.max_sessions_per_user,
            expiration: defaults.expiration,
            cleanup_interval: defaults.cleanup_interval,
            preview_base_port: defaults.preview_base_port,
            default_branch_base: defaults.default_branch_base,
            restart_delay: defaults.restart_delay,
            teardown_timeout: defaults.teardown_timeout,
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml).map_err(Error::from)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        if self.sessions.max_per_user == 0 {
            return Err(Error::InvalidConfig(
                "sessions.max_per_user must be at least 1".to_string(),
            ));
        }
        if self.proxy.domain.trim().is_empty() {
            return Err(Error::InvalidConfig("proxy.domain cannot be empty".to_string()));
        }
        if self.deploy.health_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "deploy.health_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Look up a configured site by name.
    pub fn site(&self, name: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.name.as_str() == name)
    }

    pub fn deploy_settings(&self) -> DeploySettings {
        DeploySettings {
            sites_root: self.paths.sites_root.clone(),
            logs_dir: Some(self.paths.logs_dir.clone()),
        }
    }

    pub fn container_settings(&self) -> ContainerSettings {
        ContainerSettings {
            base_port: self.deploy.base_port,
            container_port: self.deploy.container_port,
            health_path: self.deploy.health_path.clone(),
            health_timeout: self.deploy.health_timeout,
            health_interval: self.deploy.health_interval,
            stop_timeout: self.deploy.stop_timeout,
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            max_sessions_per_user: self.sessions.max_per_user,
            expiration: self.sessions.expiration,
            cleanup_interval: self.sessions.cleanup_interval,
            preview_base_port: self.sessions.preview_base_port,
            domain: self.proxy.domain.clone(),
            scheme: self.proxy.scheme.clone(),
            default_branch_base: self.sessions.default_branch_base.clone(),
            restart_delay: self.sessions.restart_delay,
            teardown_timeout: self.sessions.teardown_timeout,
        }
    }

    /// Working tree path for a site.
    pub fn site_path(&self, name: &SiteName) -> PathBuf {
        self.paths.sites_root.join(name.as_str())
    }

    pub fn template() -> Result<Self> {
        let name = SiteName::new("my-site").map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Ok(Config {
            paths: PathsConfig::default(),
            proxy: ProxyConfig {
                domain: "sites.example.com".to_string(),
                ..ProxyConfig::default()
            },
            deploy: DeployConfig::default(),
            sessions: SessionsConfig::default(),
            sites: NonEmpty::new(SiteConfig {
                name,
                repo: "https://github.com/example/my-site.git".to_string(),
                branch: default_branch(),
                persistent_storage: false,
                env: BTreeMap::new(),
            }),
        })
    }
}
