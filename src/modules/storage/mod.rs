//! Storage module for file management
//!
//! Resolves logical disk names to directories on the local filesystem and
//! builds public URLs for disks that are served over HTTP.

mod local_disk;

pub use local_disk::DiskRegistry;

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Unknown storage disk '{0}'")]
    UnknownDisk(String),

    #[error("Path '{0}' escapes its disk")]
    InvalidPath(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability handed to services that read or write stored files
pub trait StorageAdapter: Send + Sync {
    fn has_disk(&self, disk: &str) -> bool;

    /// Directory holding the files of `disk`
    fn path_prefix(&self, disk: &str) -> Result<PathBuf, StorageError>;

    /// Public URL of `path` on `disk`, `None` when the disk is not served
    fn public_url(&self, disk: &str, path: &str) -> Result<Option<String>, StorageError>;

    /// Absolute location of a storage-relative `path` on `disk`
    fn resolve(&self, disk: &str, path: &str) -> Result<PathBuf, StorageError> {
        if !is_contained(Path::new(path)) {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.path_prefix(disk)?.join(path))
    }
}

/// True when a relative path cannot leave the directory it is joined to
pub fn is_contained(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
