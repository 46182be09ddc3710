// src/container/mod.rs
pub mod runtimes;
pub mod volumes;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ProbeKind, Settings};
use runtimes::docker::{DockerBackend, DockerProbe};
use volumes::WalkDirProbe;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to connect to Docker: {0}")]
    Connect(String),
    #[error("Failed to list containers: {0}")]
    List(String),
    #[error("No such container: {0}")]
    NotFound(String),
    #[error("Failed to inspect container {id}: {reason}")]
    Inspect { id: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("helper container failed: {0}")]
    Helper(String),
    #[error("helper container exited with status {0}")]
    NonZeroExit(i64),
    #[error("empty probe output")]
    EmptyOutput,
    #[error("unparsable probe output '{0}'")]
    Unparsable(String),
    #[error("volume {0} has no mountpoint")]
    NoMountpoint(String),
    #[error("walking volume failed: {0}")]
    Walk(String),
}

/// Running container as returned by the list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    Volume,
    Bind,
    Tmpfs,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub kind: MountKind,
    /// Volume name; empty for bind and tmpfs mounts
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPort {
    /// Container side key, e.g. `80/tcp`
    pub container_port: String,
    pub host_ports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub mounts: Vec<MountInfo>,
    pub ports: Vec<PublishedPort>,
}

#[async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Running containers in backend order.
    async fn list_running(&self) -> Result<Vec<ContainerRef>, BackendError>;
    async fn inspect(&self, id: &str) -> Result<ContainerDetails, BackendError>;
}

#[async_trait]
pub trait VolumeSizeProbe: Send + Sync {
    /// Total size of the named volume in bytes.
    async fn measure(&self, volume: &str) -> Result<u64, ProbeError>;
}

/// Backend handle and probe bound to one daemon connection.
pub struct Session {
    pub backend: Box<dyn ContainerBackend>,
    pub probe: Box<dyn VolumeSizeProbe>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Session, BackendError>;
}

/// Opens a fresh daemon connection per call.
#[derive(Debug, Clone)]
pub struct DockerConnector {
    settings: Arc<Settings>,
}

impl DockerConnector {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for DockerConnector {
    async fn connect(&self) -> Result<Session, BackendError> {
        let client = runtimes::docker::connect(&self.settings).await?;
        let probe: Box<dyn VolumeSizeProbe> = match self.settings.probe {
            ProbeKind::Docker => Box::new(DockerProbe::new(client.clone(), &self.settings)),
            ProbeKind::Walk => Box::new(WalkDirProbe::new(client.clone())),
        };
        Ok(Session {
            backend: Box::new(DockerBackend::new(client)),
            probe,
        })
    }
}

/// First 12 characters of a container id; shorter ids are kept whole.
pub fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_truncates_to_twelve() {
        assert_eq!(short_id("abcdef1234567890"), "abcdef123456");
        assert_eq!(short_id("abcdef1234567890").len(), 12);
    }

    #[test]
    fn short_id_keeps_short_ids() {
        assert_eq!(short_id("abc"), "abc");
    }
}
