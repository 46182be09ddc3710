// src/config.rs
use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;

pub const LISTEN_PORT: u16 = 6969;
pub const DOCKER_API_VERSION: &str = "1.43";
pub const HELPER_IMAGE: &str = "busybox";
pub const HELPER_MOUNT_PATH: &str = "/mnt";
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid API version '{0}': expected <major>.<minor>")]
    InvalidApiVersion(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiVersion {
    pub major: usize,
    pub minor: usize,
}

impl FromStr for ApiVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidApiVersion(s.to_string());
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// How volume sizes are measured.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeKind {
    /// Run `du` inside a disposable helper container
    Docker,
    /// Walk the volume's mountpoint on the host
    Walk,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub listen_port: u16,
    pub api_version: ApiVersion,
    /// `DOCKER_HOST` style address; the local socket is used when unset
    pub docker_host: Option<String>,
    /// Verify the daemon with the client certificates in `docker_cert_path`
    pub docker_tls_verify: bool,
    pub docker_cert_path: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    pub helper_image: String,
    pub helper_mount_path: String,
    /// Upper bound for a single volume measurement
    pub measure_timeout: Duration,
    pub probe: ProbeKind,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_port: LISTEN_PORT,
            api_version: ApiVersion { major: 1, minor: 43 },
            docker_host: None,
            docker_tls_verify: false,
            docker_cert_path: None,
            connect_timeout_secs: 120,
            helper_image: HELPER_IMAGE.to_string(),
            helper_mount_path: HELPER_MOUNT_PATH.to_string(),
            measure_timeout: Duration::from_secs(120),
            probe: ProbeKind::Docker,
        }
    }
}

impl Settings {
    pub fn new(docker_host: Option<String>, probe: ProbeKind) -> Result<Self, ConfigError> {
        Ok(Self {
            api_version: DOCKER_API_VERSION.parse()?,
            docker_host: docker_host.filter(|h| !h.trim().is_empty()),
            probe,
            ..Default::default()
        })
    }

    /// Applies `DOCKER_TLS_VERIFY` / `DOCKER_CERT_PATH`. Any non-empty verify
    /// value turns TLS on; the cert directory defaults to `~/.docker`.
    pub fn with_tls(mut self, tls_verify: Option<String>, cert_path: Option<PathBuf>) -> Self {
        let verify = tls_verify.is_some_and(|v| !v.trim().is_empty());
        self.docker_tls_verify = verify;
        self.docker_cert_path = cert_path
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| {
                std::env::var_os("HOME")
                    .filter(|_| verify)
                    .map(|home| PathBuf::from(home).join(".docker"))
            });
        self
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.listen_port)
    }
}
