// ABOUTME: Containers implementation over the Docker-compatible API via bollard.
// ABOUTME: Works against Docker and Podman sockets; blue-green is tracked by container name.

use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{ContainerCreateBody, HostConfig, Mount, MountTypeEnum, PortBinding};
use bollard::query_parameters::{
    CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions, RemoveImageOptions,
    RenameContainerOptions, StartContainerOptions, StopContainerOptions,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::build::{BuildPipeline, has_dockerfile};
use super::detection::detect_socket;
use super::error::ContainerError;
use super::health::wait_until_healthy;
use super::{
    ContainerRecord, ContainerSettings, Containers, PREVIEW_LABEL, PreviewContainer, PreviewSpec,
    PreviewStrategy, SITE_LABEL, StartOptions, StartedContainer, next_name, preview_image,
    serving_name, volume_name,
};
use crate::ports::{DEFAULT_MAX_ATTEMPTS, find_available_port};
use crate::store::SessionMode;
use crate::types::SiteName;

// Host ports tried before giving up on bind conflicts
const BIND_RETRIES: usize = 5;

/// Everything needed to create one container.
struct Spec<'a> {
    name: &'a str,
    image: &'a str,
    host_port: u16,
    env: Vec<String>,
    labels: HashMap<String, String>,
    volume: Option<String>,
}

/// Site and preview containers managed through a Docker-compatible socket.
pub struct BollardContainers {
    client: Docker,
    settings: ContainerSettings,
    builder: Arc<dyn BuildPipeline>,
}

impl BollardContainers {
    pub fn new(client: Docker, settings: ContainerSettings, builder: Arc<dyn BuildPipeline>) -> Self {
        Self {
            client,
            settings,
            builder,
        }
    }

    /// Connect to the first runtime socket found on this host.
    pub fn connect_local(
        settings: ContainerSettings,
        builder: Arc<dyn BuildPipeline>,
    ) -> Result<Self, ContainerError> {
        let socket = detect_socket()?;
        Self::connect(&socket, settings, builder)
    }

    pub fn connect(
        socket: &Path,
        settings: ContainerSettings,
        builder: Arc<dyn BuildPipeline>,
    ) -> Result<Self, ContainerError> {
        let socket = socket.to_string_lossy();
        let client = Docker::connect_with_unix(&socket, 120, bollard::API_DEFAULT_VERSION)
            .map_err(|e| ContainerError::Unavailable(e.to_string()))?;
        tracing::debug!(socket = %socket, "connected to container runtime");
        Ok(Self::new(client, settings, builder))
    }

    fn base_env(&self) -> Vec<String> {
        vec![format!("PORT={}", self.settings.container_port)]
    }

    /// Create and start a container, returning its id.
    ///
    /// A failed start removes the created container so the name is free again.
    async fn run(&self, spec: &Spec<'_>) -> Result<String, bollard::errors::Error> {
        let port_key = format!("{}/tcp", self.settings.container_port);
        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        port_bindings.insert(
            port_key.clone(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(spec.host_port.to_string()),
            }]),
        );

        let mounts = spec.volume.as_ref().map(|volume| {
            vec![Mount {
                source: Some(volume.clone()),
                target: Some("/data".to_string()),
                typ: Some(MountTypeEnum::VOLUME),
                ..Default::default()
            }]
        });

        let body = ContainerCreateBody {
            image: Some(spec.image.to_string()),
            env: Some(spec.env.clone()),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(vec![port_key]),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                mounts,
                ..Default::default()
            }),
            ..Default::default()
        };

        let opts = CreateContainerOptions {
            name: Some(spec.name.to_string()),
            ..Default::default()
        };

        let created = self.client.create_container(Some(opts), body).await?;

        if let Err(e) = self
            .client
            .start_container(&created.id, None::<StartContainerOptions>)
            .await
        {
            if let Err(remove_err) = self.remove_container(spec.name, true).await {
                tracing::warn!(name = spec.name, error = %remove_err, "failed to remove unstarted container");
            }
            return Err(e);
        }

        Ok(created.id)
    }

    async fn inspect(
        &self,
        name: &str,
    ) -> Result<Option<bollard::models::ContainerInspectResponse>, ContainerError> {
        match self
            .client
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => Ok(Some(details)),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(ContainerError::from_api(e)),
        }
    }
}

#[async_trait]
impl Containers for BollardContainers {
    async fn create_container(
        &self,
        spec: &PreviewSpec,
        mode: SessionMode,
    ) -> Result<Option<PreviewContainer>, ContainerError> {
        if !has_dockerfile(&spec.path) {
            tracing::info!(site = %spec.site, path = %spec.path.display(), "nothing to preview");
            return Ok(None);
        }

        let image = preview_image(&spec.container_name);
        let output = self.builder.build(&spec.site, &spec.path, &image).await?;
        if !output.success {
            return Err(ContainerError::Runtime(format!(
                "preview image build failed: {}",
                output.error.unwrap_or_default()
            )));
        }

        self.remove_container(&spec.container_name, true).await?;

        let mut env = self.base_env();
        env.push(format!("SLIPWAY_MODE={mode}"));
        env.push(format!("SLIPWAY_BRANCH={}", spec.branch));

        let labels = HashMap::from([
            (PREVIEW_LABEL.to_string(), "true".to_string()),
            (SITE_LABEL.to_string(), spec.site.to_string()),
        ]);

        let run = Spec {
            name: &spec.container_name,
            image: &image,
            host_port: spec.port,
            env,
            labels,
            volume: None,
        };

        match self.run(&run).await {
            Ok(_) => Ok(Some(PreviewContainer {
                name: spec.container_name.clone(),
                port: spec.port,
            })),
            Err(e) if ContainerError::is_bind_conflict(&e) => Err(ContainerError::PortInUse(spec.port)),
            Err(e) => Err(ContainerError::from_api(e)),
        }
    }

    async fn stop_container(&self, name: &str) -> Result<(), ContainerError> {
        let opts = StopContainerOptions {
            t: Some(self.settings.stop_timeout.as_secs() as i32),
            signal: None,
        };

        match self.client.stop_container(name, Some(opts)).await {
            Ok(()) => Ok(()),
            // Already stopped
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(ContainerError::from_api(e)),
        }
    }

    async fn remove_container(&self, name: &str, force: bool) -> Result<(), ContainerError> {
        let opts = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        match self.client.remove_container(name, Some(opts)).await {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(ContainerError::from_api(e)),
        }
    }

    async fn remove_image(&self, image: &str) -> Result<(), ContainerError> {
        let opts = RemoveImageOptions {
            force: true,
            ..Default::default()
        };

        match self.client.remove_image(image, Some(opts), None).await {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(ContainerError::from_api(e)),
        }
    }

    async fn is_container_running(&self, name: &str) -> Result<bool, ContainerError> {
        Ok(self
            .inspect(name)
            .await?
            .and_then(|d| d.state)
            .and_then(|s| s.running)
            .unwrap_or(false))
    }

    async fn get_container(&self, name: &str) -> Result<Option<ContainerRecord>, ContainerError> {
        let Some(details) = self.inspect(name).await? else {
            return Ok(None);
        };

        let running = details
            .state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false);
        let config = details.config.unwrap_or_default();
        let is_preview = config
            .labels
            .as_ref()
            .and_then(|l| l.get(PREVIEW_LABEL))
            .is_some_and(|v| v == "true");

        Ok(Some(ContainerRecord {
            name: name.to_string(),
            image: config.image.unwrap_or_default(),
            strategy: if is_preview {
                PreviewStrategy::Container
            } else {
                PreviewStrategy::Process
            },
            running,
        }))
    }

    async fn start_container(
        &self,
        image: &str,
        site: &SiteName,
        options: &StartOptions,
    ) -> Result<StartedContainer, ContainerError> {
        let name = if options.blue_green {
            next_name(site)
        } else {
            serving_name(site)
        };

        // Leftovers from an interrupted deploy would block the name
        self.remove_container(&name, true).await?;

        let mut env = self.base_env();
        env.extend(options.env.iter().map(|(k, v)| format!("{k}={v}")));

        let labels = HashMap::from([(SITE_LABEL.to_string(), site.to_string())]);
        let volume = options.persistent_storage.then(|| volume_name(site));

        let mut next_start = self.settings.base_port;
        for attempt in 1..=BIND_RETRIES {
            let port = find_available_port(next_start, DEFAULT_MAX_ATTEMPTS)
                .ok_or(ContainerError::NoFreePort(next_start))?;

            let spec = Spec {
                name: &name,
                image,
                host_port: port,
                env: env.clone(),
                labels: labels.clone(),
                volume: volume.clone(),
            };

            match self.run(&spec).await {
                Ok(container_id) => {
                    tracing::info!(site = %site, name = %name, port, "container started");
                    return Ok(StartedContainer {
                        container_id,
                        port,
                        is_blue_green: options.blue_green,
                    });
                }
                Err(e) if ContainerError::is_bind_conflict(&e) => {
                    tracing::warn!(port, attempt, "host port taken, trying next");
                    next_start = port.checked_add(1).ok_or(ContainerError::NoFreePort(port))?;
                }
                Err(e) => return Err(ContainerError::from_api(e)),
            }
        }

        Err(ContainerError::NoFreePort(next_start))
    }

    async fn wait_for_container_health(&self, port: u16) -> Result<bool, ContainerError> {
        Ok(wait_until_healthy(
            port,
            &self.settings.health_path,
            self.settings.health_interval,
            self.settings.health_timeout,
        )
        .await)
    }

    async fn complete_blue_green(&self, site: &SiteName) -> Result<(), ContainerError> {
        let next = next_name(site);
        if self.inspect(&next).await?.is_none() {
            return Err(ContainerError::NoPendingSwitch(site.to_string()));
        }

        let serving = serving_name(site);
        self.stop_container(&serving).await.or_else(|e| match e {
            ContainerError::NotFound(_) => Ok(()),
            other => Err(other),
        })?;
        self.remove_container(&serving, true).await?;

        self.client
            .rename_container(
                &next,
                RenameContainerOptions {
                    name: serving.clone(),
                },
            )
            .await
            .map_err(ContainerError::from_api)?;

        tracing::info!(site = %site, "blue-green switch complete");
        Ok(())
    }

    async fn rollback_blue_green(&self, site: &SiteName) -> Result<(), ContainerError> {
        self.remove_container(&next_name(site), true).await?;
        tracing::info!(site = %site, "blue-green deployment rolled back");
        Ok(())
    }
}
