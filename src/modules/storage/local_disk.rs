use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use tracing::info;

use super::{StorageAdapter, StorageError};
use crate::core::config::StorageConfig;

/// A directory on the local filesystem, optionally served under a URL prefix
#[derive(Debug, Clone)]
pub struct Disk {
    pub root: PathBuf,
    pub url: Option<String>,
}

/// Named disks known to the application
#[derive(Debug, Clone, Default)]
pub struct DiskRegistry {
    disks: HashMap<String, Disk>,
}

impl DiskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `public` (served at the configured URL) and `local` (not served)
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new()
            .with_disk(
                "public",
                Disk {
                    root: config.root.join("public"),
                    url: Some(config.public_url.clone()),
                },
            )
            .with_disk(
                "local",
                Disk {
                    root: config.root.join("local"),
                    url: None,
                },
            )
    }

    pub fn with_disk(mut self, name: impl Into<String>, disk: Disk) -> Self {
        self.disks.insert(name.into(), disk);
        self
    }

    /// Create every disk root that does not exist yet
    pub fn ensure_directories(&self) -> Result<(), StorageError> {
        for (name, disk) in &self.disks {
            fs::create_dir_all(&disk.root)?;
            info!("Storage disk '{}' ready at {}", name, disk.root.display());
        }
        Ok(())
    }

    /// Disks with a URL prefix, as (prefix, root) pairs for static serving
    pub fn served_disks(&self) -> Vec<(String, PathBuf)> {
        let mut served: Vec<(String, PathBuf)> = self
            .disks
            .values()
            .filter_map(|disk| disk.url.clone().map(|url| (url, disk.root.clone())))
            .filter(|(url, _)| url.starts_with('/'))
            .collect();
        served.sort();
        served
    }

    fn disk(&self, name: &str) -> Result<&Disk, StorageError> {
        self.disks
            .get(name)
            .ok_or_else(|| StorageError::UnknownDisk(name.to_string()))
    }
}

impl StorageAdapter for DiskRegistry {
    fn has_disk(&self, disk: &str) -> bool {
        self.disks.contains_key(disk)
    }

    fn path_prefix(&self, disk: &str) -> Result<PathBuf, StorageError> {
        Ok(self.disk(disk)?.root.clone())
    }

    fn public_url(&self, disk: &str, path: &str) -> Result<Option<String>, StorageError> {
        let Some(base) = self.disk(disk)?.url.as_deref() else {
            return Ok(None);
        };

        let encoded: Vec<String> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();

        Ok(Some(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            encoded.join("/")
        )))
    }
}
