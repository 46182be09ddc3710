// src/container/volumes.rs
use async_trait::async_trait;
use bollard::Docker;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{ProbeError, VolumeSizeProbe};

/// Measures a volume by walking its mountpoint on the host. Needs read access
/// to the daemon's volume directory.
#[derive(Debug, Clone)]
pub struct WalkDirProbe {
    client: Docker,
}

impl WalkDirProbe {
    pub fn new(client: Docker) -> Self {
        Self { client }
    }

    async fn mountpoint(&self, volume: &str) -> Result<PathBuf, ProbeError> {
        let inspect = self
            .client
            .inspect_volume(volume)
            .await
            .map_err(|e| ProbeError::Helper(format!("inspect volume: {}", e)))?;

        if inspect.mountpoint.is_empty() {
            return Err(ProbeError::NoMountpoint(volume.to_string()));
        }
        Ok(PathBuf::from(inspect.mountpoint))
    }
}

#[async_trait]
impl VolumeSizeProbe for WalkDirProbe {
    async fn measure(&self, volume: &str) -> Result<u64, ProbeError> {
        let path = self.mountpoint(volume).await?;
        tokio::task::spawn_blocking(move || directory_size(&path))
            .await
            .map_err(|e| ProbeError::Walk(e.to_string()))?
    }
}

/// Sum of the apparent sizes of all regular files below `path`.
pub fn directory_size(path: &Path) -> Result<u64, ProbeError> {
    if !path.is_dir() {
        return Err(ProbeError::Walk(format!(
            "{} is not a directory",
            path.display()
        )));
    }

    // Entries that vanish or can't be read mid-walk are skipped
    Ok(WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.metadata().ok())
        .filter(|metadata| metadata.is_file())
        .map(|metadata| metadata.len())
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn sums_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), vec![0u8; 1000]).unwrap();
        fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        fs::write(dir.path().join("nested/b.bin"), vec![0u8; 24]).unwrap();
        fs::write(dir.path().join("nested/deeper/c.bin"), vec![0u8; 2048]).unwrap();

        assert_eq!(directory_size(dir.path()).unwrap(), 3072);
    }

    #[test]
    fn empty_directory_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(directory_size(dir.path()).unwrap(), 0);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        assert!(matches!(
            directory_size(&missing),
            Err(ProbeError::Walk(_))
        ));
    }
}
