// ABOUTME: Composition root: wires config, persistence, git, containers, and routes.
// ABOUTME: Seeds configured sites into the state file on every start.

use slipway::config::Config;
use slipway::deploy::Orchestrator;
use slipway::error::{Error, Result};
use slipway::git::GitCli;
use slipway::proxy::RouteTable;
use slipway::runtime::{BollardContainers, BuildPipeline, CliBuilder};
use slipway::session::SessionManager;
use slipway::store::{FileStore, NewSite, Site, Store};
use slipway::types::SiteName;
use std::env;
use std::path::Path;
use std::sync::Arc;

pub struct App {
    pub config: Config,
    pub store: Arc<FileStore>,
    pub orchestrator: Orchestrator,
    pub sessions: Arc<SessionManager>,
}

impl App {
    pub async fn open(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => Config::load(path)?,
            None => Config::discover(&env::current_dir()?)?,
        };

        let store = Arc::new(FileStore::open(&config.paths.state_file).await?);
        seed_sites(&config, store.as_ref()).await?;

        let git = Arc::new(GitCli::new());
        let builder: Arc<dyn BuildPipeline> = Arc::new(CliBuilder::new("docker"));
        let containers = Arc::new(
            BollardContainers::connect_local(config.container_settings(), builder.clone())
                .map_err(|e| Error::Runtime(e.to_string()))?,
        );
        let routes = Arc::new(
            RouteTable::load(
                config.proxy.domain.clone(),
                config.proxy.routes_file.clone(),
                config.proxy.route_ttl,
            )
            .await?,
        );

        let orchestrator = Orchestrator::new(
            store.clone(),
            git.clone(),
            containers.clone(),
            builder,
            config.deploy_settings(),
        );
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            git,
            containers,
            routes,
            config.session_settings(),
        ));

        Ok(App {
            config,
            store,
            orchestrator,
            sessions,
        })
    }

    pub async fn site(&self, name: &str) -> Result<Site> {
        let name = SiteName::new(name).map_err(|_| Error::UnknownSite(name.to_string()))?;
        self.store
            .site_by_name(&name)
            .await?
            .ok_or_else(|| Error::UnknownSite(name.to_string()))
    }
}

/// Insert configured sites that are new; refresh source settings of known ones.
async fn seed_sites(config: &Config, store: &dyn Store) -> Result<()> {
    for site in config.sites.iter() {
        match store.site_by_name(&site.name).await? {
            Some(mut existing) => {
                existing.repo_url = site.repo.clone();
                existing.branch = site.branch.clone();
                existing.persistent_storage = site.persistent_storage;
                existing.env_vars = site.env.clone();
                store.update_site(&existing).await?;
            }
            None => {
                let created = store
                    .insert_site(NewSite {
                        name: site.name.clone(),
                        repo_url: site.repo.clone(),
                        branch: site.branch.clone(),
                        persistent_storage: site.persistent_storage,
                        env_vars: site.env.clone(),
                    })
                    .await?;
                tracing::info!(site = %created.name, id = %created.id, "site registered");
            }
        }
    }
    Ok(())
}
