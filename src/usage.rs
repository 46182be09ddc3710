// src/usage.rs
pub mod format;

use serde::Serialize;
use std::time::Duration;

use crate::container::{
    short_id, BackendError, ContainerBackend, ContainerDetails, MountKind, PublishedPort, Session,
    VolumeSizeProbe,
};
use crate::metrics;
use format::{human_size, usage_mb};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeUsageReport {
    pub container_name: String,
    pub container_id: String,
    pub volume_name: String,
    pub usage: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub usage_mb: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

/// Named volumes of one container together with its first published port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerVolumes {
    pub name: String,
    pub id: String,
    pub volumes: Vec<String>,
    pub port: Option<String>,
}

impl ContainerVolumes {
    fn from_details(name: String, id: &str, details: ContainerDetails) -> Self {
        Self {
            name,
            id: short_id(id),
            port: first_published_port(&details.ports),
            volumes: details
                .mounts
                .into_iter()
                .filter(|mount| mount.kind == MountKind::Volume)
                .map(|mount| mount.name)
                .collect(),
        }
    }
}

/// Host port of the first binding that has a non-empty one. Bindings are ordered by
/// container port so the pick does not depend on map iteration order.
pub fn first_published_port(ports: &[PublishedPort]) -> Option<String> {
    let mut candidates: Vec<&PublishedPort> = ports
        .iter()
        .filter(|p| p.host_ports.iter().any(|h| !h.is_empty()))
        .collect();
    candidates.sort_by_key(|p| {
        let number = p
            .container_port
            .split('/')
            .next()
            .and_then(|n| n.parse::<u16>().ok())
            .unwrap_or(u16::MAX);
        (number, p.container_port.clone())
    });
    candidates
        .first()
        .and_then(|p| p.host_ports.iter().find(|h| !h.is_empty()).cloned())
}

/// All running containers with their volumes. A container that can't be
/// inspected is skipped; a failed listing fails the whole call.
pub async fn enumerate_all(
    backend: &dyn ContainerBackend,
) -> Result<Vec<ContainerVolumes>, BackendError> {
    let log = slog_scope::logger();
    let containers = backend.list_running().await?;
    let mut result = Vec::with_capacity(containers.len());

    for container in containers {
        match backend.inspect(&container.id).await {
            Ok(details) => {
                let name = if container.name.is_empty() {
                    details.name.clone()
                } else {
                    container.name
                };
                result.push(ContainerVolumes::from_details(name, &container.id, details));
            }
            Err(e) => {
                slog::warn!(log, "Skipping container";
                    "container" => &container.id,
                    "error" => e.to_string()
                );
                metrics::record_container_skipped();
            }
        }
    }

    Ok(result)
}

pub async fn enumerate_one(
    backend: &dyn ContainerBackend,
    id: &str,
) -> Result<ContainerVolumes, BackendError> {
    let details = backend.inspect(id).await?;
    let full_id = details.id.clone();
    Ok(ContainerVolumes::from_details(
        details.name.clone(),
        &full_id,
        details,
    ))
}

/// Size of a volume in bytes. Failures and timeouts are logged and count as
/// zero so one bad volume never sinks the report.
pub async fn volume_bytes(probe: &dyn VolumeSizeProbe, volume: &str, limit: Duration) -> u64 {
    let log = slog_scope::logger();
    let bytes = match tokio::time::timeout(limit, probe.measure(volume)).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            slog::warn!(log, "Failed to measure volume";
                "volume" => volume,
                "error" => e.to_string()
            );
            metrics::record_measurement_failure();
            0
        }
        Err(_) => {
            slog::warn!(log, "Volume measurement timed out";
                "volume" => volume,
                "timeout_secs" => limit.as_secs_f64()
            );
            metrics::record_measurement_failure();
            0
        }
    };
    metrics::record_volume_usage(volume, bytes);
    bytes
}

/// Measures every volume in order, one at a time.
pub async fn assemble(
    probe: &dyn VolumeSizeProbe,
    containers: Vec<ContainerVolumes>,
    limit: Duration,
) -> Vec<VolumeUsageReport> {
    let mut reports = Vec::new();
    for container in containers {
        for volume in &container.volumes {
            let bytes = volume_bytes(probe, volume, limit).await;
            reports.push(VolumeUsageReport {
                container_name: container.name.clone(),
                container_id: container.id.clone(),
                volume_name: volume.clone(),
                usage: human_size(bytes),
                usage_mb: usage_mb(bytes),
                port: container.port.clone(),
            });
        }
    }
    reports
}

/// Full pass. The volume gauge is cleared first so it only carries volumes
/// that are still mounted.
pub async fn collect_all(
    session: &Session,
    limit: Duration,
) -> Result<Vec<VolumeUsageReport>, BackendError> {
    let containers = enumerate_all(session.backend.as_ref()).await?;
    metrics::reset_volume_usage();
    Ok(assemble(session.probe.as_ref(), containers, limit).await)
}

pub async fn collect_one(
    session: &Session,
    id: &str,
    limit: Duration,
) -> Result<Vec<VolumeUsageReport>, BackendError> {
    let container = enumerate_one(session.backend.as_ref(), id).await?;
    Ok(assemble(session.probe.as_ref(), vec![container], limit).await)
}
