// src/container/runtimes/docker.rs
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{
    ContainerInspectResponse, ContainerSummary, HostConfig, Mount, MountPointTypeEnum,
    MountTypeEnum,
};
use bollard::{ClientVersion, Docker};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

use crate::config::{Settings, DEFAULT_DOCKER_SOCKET};
use crate::container::{
    BackendError, ContainerBackend, ContainerDetails, ContainerRef, MountInfo, MountKind,
    ProbeError, PublishedPort, VolumeSizeProbe,
};

const HELPER_LABEL: &str = "volstat.helper";

/// Where the daemon is reached, resolved from `DOCKER_HOST` and the TLS settings.
#[derive(Debug, PartialEq, Eq)]
enum Endpoint<'a> {
    Local(&'a str),
    Http(&'a str),
    Tls { addr: &'a str, cert_dir: &'a Path },
}

fn endpoint(settings: &Settings) -> Endpoint<'_> {
    match settings.docker_host.as_deref() {
        Some(host)
            if host.starts_with("tcp://")
                || host.starts_with("http://")
                || host.starts_with("https://") =>
        {
            match settings.docker_cert_path.as_deref() {
                Some(cert_dir) if settings.docker_tls_verify => Endpoint::Tls {
                    addr: host,
                    cert_dir,
                },
                _ => Endpoint::Http(host),
            }
        }
        Some(host) => Endpoint::Local(host.trim_start_matches("unix://")),
        None => Endpoint::Local(DEFAULT_DOCKER_SOCKET),
    }
}

/// Connects to the daemon with the API version pinned, and pings it so an
/// unreachable daemon fails here.
pub async fn connect(settings: &Settings) -> Result<Docker, BackendError> {
    let version = ClientVersion {
        major_version: settings.api_version.major,
        minor_version: settings.api_version.minor,
    };
    let timeout = settings.connect_timeout_secs;

    let client = match endpoint(settings) {
        Endpoint::Local(path) => Docker::connect_with_local(path, timeout, &version),
        Endpoint::Http(addr) => Docker::connect_with_http(addr, timeout, &version),
        Endpoint::Tls { addr, cert_dir } => Docker::connect_with_ssl(
            addr,
            &cert_dir.join("key.pem"),
            &cert_dir.join("cert.pem"),
            &cert_dir.join("ca.pem"),
            timeout,
            &version,
        ),
    }
    .map_err(|e| BackendError::Connect(e.to_string()))?;

    client
        .ping()
        .await
        .map_err(|e| BackendError::Connect(e.to_string()))?;

    Ok(client)
}

/// Force-removes helper containers left behind by a previous run.
pub async fn sweep_helpers(client: &Docker) -> Result<usize, BackendError> {
    let leftovers = client
        .list_containers(Some(ListContainersOptions::<String> {
            all: true,
            filters: helper_filters(),
            ..Default::default()
        }))
        .await
        .map_err(|e| BackendError::List(e.to_string()))?;

    let mut removed = 0;
    for id in leftovers.into_iter().filter_map(|c| c.id) {
        if remove_helper(client, &id).await {
            removed += 1;
        }
    }
    Ok(removed)
}

fn helper_filters() -> HashMap<String, Vec<String>> {
    HashMap::from([("label".to_string(), vec![HELPER_LABEL.to_string()])])
}

#[derive(Debug, Clone)]
pub struct DockerBackend {
    client: Docker,
}

impl DockerBackend {
    pub fn new(client: Docker) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContainerBackend for DockerBackend {
    async fn list_running(&self) -> Result<Vec<ContainerRef>, BackendError> {
        let containers = self
            .client
            .list_containers(Some(ListContainersOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .map_err(|e| BackendError::List(e.to_string()))?;

        slog::debug!(slog_scope::logger(), "Found containers";
            "count" => containers.len()
        );

        Ok(containers.into_iter().filter_map(container_ref).collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails, BackendError> {
        match self
            .client
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(response) => Ok(container_details(id, response)),
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(BackendError::NotFound(id.to_string())),
            Err(e) => Err(BackendError::Inspect {
                id: id.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

fn container_ref(summary: ContainerSummary) -> Option<ContainerRef> {
    let id = summary.id?;
    let name = summary
        .names
        .unwrap_or_default()
        .into_iter()
        .map(|name| name.trim_start_matches('/').to_string())
        .next()
        .unwrap_or_default();
    Some(ContainerRef { id, name })
}

fn mount_kind(typ: Option<&MountPointTypeEnum>) -> MountKind {
    match typ {
        Some(MountPointTypeEnum::VOLUME) => MountKind::Volume,
        Some(MountPointTypeEnum::BIND) => MountKind::Bind,
        Some(MountPointTypeEnum::TMPFS) => MountKind::Tmpfs,
        _ => MountKind::Other,
    }
}

fn container_details(requested: &str, response: ContainerInspectResponse) -> ContainerDetails {
    let mounts = response
        .mounts
        .unwrap_or_default()
        .into_iter()
        .map(|mount| MountInfo {
            kind: mount_kind(mount.typ.as_ref()),
            name: mount.name.unwrap_or_default(),
        })
        .collect();

    let ports = response
        .network_settings
        .and_then(|settings| settings.ports)
        .unwrap_or_default()
        .into_iter()
        .map(|(container_port, bindings)| PublishedPort {
            container_port,
            host_ports: bindings
                .unwrap_or_default()
                .into_iter()
                .filter_map(|binding| binding.host_port)
                .filter(|host_port| !host_port.is_empty())
                .collect(),
        })
        .collect();

    ContainerDetails {
        id: response.id.unwrap_or_else(|| requested.to_string()),
        name: response
            .name
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string(),
        mounts,
        ports,
    }
}

/// Measures a volume by running `du -sb` in a throwaway helper container.
#[derive(Debug, Clone)]
pub struct DockerProbe {
    client: Docker,
    image: String,
    mount_path: String,
}

impl DockerProbe {
    pub fn new(client: Docker, settings: &Settings) -> Self {
        Self {
            client,
            image: settings.helper_image.clone(),
            mount_path: settings.helper_mount_path.clone(),
        }
    }

    async fn ensure_image(&self) -> Result<(), ProbeError> {
        if self.client.inspect_image(&self.image).await.is_ok() {
            return Ok(());
        }

        let (from_image, tag) = split_image_ref(&self.image);
        slog::info!(slog_scope::logger(), "Pulling helper image";
            "image" => from_image,
            "tag" => tag
        );

        let mut pull = self.client.create_image(
            Some(CreateImageOptions {
                from_image,
                tag,
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = pull.next().await {
            progress.map_err(|e| ProbeError::Helper(format!("pull {}: {}", self.image, e)))?;
        }
        Ok(())
    }

    async fn create_helper(&self, volume: &str) -> Result<HelperContainer, ProbeError> {
        let name = format!("volstat-du-{}", Uuid::new_v4());

        let host_config = HostConfig {
            mounts: Some(vec![Mount {
                target: Some(self.mount_path.clone()),
                source: Some(volume.to_string()),
                typ: Some(MountTypeEnum::VOLUME),
                read_only: Some(false),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let config = Config {
            image: Some(self.image.clone()),
            cmd: Some(vec![
                "du".to_string(),
                "-sb".to_string(),
                self.mount_path.clone(),
            ]),
            labels: Some(HashMap::from([(HELPER_LABEL.to_string(), volume.to_string())])),
            host_config: Some(host_config),
            ..Default::default()
        };

        // Armed before the create call so a cancelled create still gets cleaned up
        let helper = HelperContainer::new(self.client.clone(), name);

        self.client
            .create_container(
                Some(CreateContainerOptions {
                    name: helper.name.as_str(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| ProbeError::Helper(format!("create: {}", e)))?;

        Ok(helper)
    }

    /// Starts the helper, waits for it to exit and returns its combined output.
    async fn run_helper(&self, name: &str) -> Result<String, ProbeError> {
        self.client
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| ProbeError::Helper(format!("start: {}", e)))?;

        let mut wait = self
            .client
            .wait_container(name, None::<WaitContainerOptions<String>>);
        let status = match wait.next().await {
            Some(Ok(response)) => response.status_code,
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => return Err(ProbeError::Helper(format!("wait: {}", e))),
            None => return Err(ProbeError::Helper("wait: no exit status".to_string())),
        };

        let mut logs = self.client.logs(
            name,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                tail: "all".to_string(),
                ..Default::default()
            }),
        );
        let mut output = String::new();
        while let Some(chunk) = logs.next().await {
            let chunk = chunk.map_err(|e| ProbeError::Helper(format!("logs: {}", e)))?;
            output.push_str(&chunk.to_string());
        }

        if status != 0 {
            slog::debug!(slog_scope::logger(), "Helper output";
                "container" => name,
                "output" => output.trim()
            );
            return Err(ProbeError::NonZeroExit(status));
        }
        Ok(output)
    }
}

#[async_trait]
impl VolumeSizeProbe for DockerProbe {
    async fn measure(&self, volume: &str) -> Result<u64, ProbeError> {
        self.ensure_image().await?;
        let mut helper = self.create_helper(volume).await?;
        let output = self.run_helper(&helper.name).await;
        helper.remove().await;
        parse_du_output(&output?)
    }
}

/// Helper container that is force-removed when dropped, so an aborted
/// measurement never leaves it behind.
struct HelperContainer {
    client: Docker,
    name: String,
    armed: bool,
}

impl HelperContainer {
    fn new(client: Docker, name: String) -> Self {
        Self {
            client,
            name,
            armed: true,
        }
    }

    /// Disarms only once the daemon confirms the container is gone, so a
    /// removal that fails or is dropped midway falls back to `Drop`.
    async fn remove(&mut self) -> bool {
        let removed = remove_helper(&self.client, &self.name).await;
        if removed {
            self.armed = false;
        }
        removed
    }
}

impl Drop for HelperContainer {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let client = self.client.clone();
        let name = std::mem::take(&mut self.name);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { remove_helper(&client, &name).await });
        }
    }
}

/// True when the container is gone, including when it never existed.
async fn remove_helper(client: &Docker, name: &str) -> bool {
    match client
        .remove_container(
            name,
            Some(RemoveContainerOptions {
                force: true,
                ..Default::default()
            }),
        )
        .await
    {
        Ok(_) => true,
        Err(DockerError::DockerResponseServerError {
            status_code: 404, ..
        }) => true,
        Err(e) => {
            slog::debug!(slog_scope::logger(), "Failed to remove helper container";
                "container" => name,
                "error" => e.to_string()
            );
            false
        }
    }
}

/// `du -sb` prints `<bytes>\t<path>`; only the leading integer matters.
pub fn parse_du_output(output: &str) -> Result<u64, ProbeError> {
    let token = output
        .split_whitespace()
        .next()
        .ok_or(ProbeError::EmptyOutput)?;
    token
        .parse::<u64>()
        .map_err(|_| ProbeError::Unparsable(token.to_string()))
}

fn split_image_ref(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, tag),
        _ => (image, "latest"),
    }
}
