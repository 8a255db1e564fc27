use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::error::{AppError, Result};
use crate::features::files::dtos::{FileDetailDto, FileDto, FileQueryParams};
use crate::features::files::models::{File, FileUpdate};
use crate::features::files::repositories::FileRepository;
use crate::modules::storage::StorageAdapter;

/// Service for reading, editing and removing stored files
pub struct FileService {
    repository: Arc<dyn FileRepository>,
    storage: Arc<dyn StorageAdapter>,
}

impl FileService {
    pub fn new(repository: Arc<dyn FileRepository>, storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            repository,
            storage,
        }
    }

    /// Page of original files with the total number of matches
    pub async fn list_files(&self, params: &FileQueryParams) -> Result<(Vec<FileDto>, i64)> {
        let (files, total) = self.repository.list(params).await?;
        Ok((files.into_iter().map(|f| self.to_dto(f)).collect(), total))
    }

    /// File with the number of modifications derived from it
    pub async fn get_file(&self, id: i64) -> Result<(FileDto, i64)> {
        let file = self.find(id).await?;
        let count = self.repository.count_modifications(file.id).await?;
        Ok((self.to_dto(file), count))
    }

    pub async fn get_file_with_modifications(&self, id: i64) -> Result<FileDetailDto> {
        let file = self.find(id).await?;
        let modifications = if file.is_modification() {
            Vec::new()
        } else {
            self.repository.modifications(file.id).await?
        };

        Ok(self.detail(file, modifications))
    }

    /// Attach public URLs to a file and its modifications
    pub fn detail(&self, file: File, modifications: Vec<File>) -> FileDetailDto {
        FileDetailDto {
            file: self.to_dto(file),
            modifications: modifications.into_iter().map(|f| self.to_dto(f)).collect(),
        }
    }

    /// Apply the editable fields; `None` when the file does not exist
    pub async fn update_file(&self, id: i64, changes: &FileUpdate) -> Result<Option<FileDto>> {
        if changes.is_empty() {
            debug!("Empty update for file {}", id);
        }

        let updated = self.repository.update(id, changes).await?;
        match &updated {
            Some(file) => info!("Updated file {}", file.id),
            None => debug!("Update skipped, file {} does not exist", id),
        }
        Ok(updated.map(|f| self.to_dto(f)))
    }

    /// Delete a file and its modifications, then their stored bytes.
    ///
    /// Returns the deleted records; empty when nothing had this id. Files that
    /// cannot be removed from disk are logged and otherwise ignored.
    pub async fn delete_file_with_modifications(&self, id: i64) -> Result<Vec<FileDto>> {
        let deleted = self.repository.delete_with_modifications(id).await?;
        if deleted.is_empty() {
            debug!("Nothing to delete for file {}", id);
            return Ok(Vec::new());
        }

        for file in &deleted {
            self.remove_stored(file).await;
        }

        info!("Deleted file {} with {} record(s)", id, deleted.len());
        Ok(deleted.into_iter().map(|f| self.to_dto(f)).collect())
    }

    /// Published file selected by `slug`, and where its bytes live
    pub async fn find_published(&self, slug: &str) -> Result<(File, PathBuf)> {
        let file = self
            .repository
            .find_published_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No published file for '{}'", slug)))?;
        let location = self.storage.resolve(&file.disk, &file.path)?;
        Ok((file, location))
    }

    async fn find(&self, id: i64) -> Result<File> {
        self.repository
            .find(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))
    }

    async fn remove_stored(&self, file: &File) {
        let location = match self.storage.resolve(&file.disk, &file.path) {
            Ok(location) => location,
            Err(e) => {
                warn!("Cannot locate stored file of record {}: {}", file.id, e);
                return;
            }
        };

        if let Err(e) = tokio::fs::remove_file(&location).await {
            warn!("Failed to remove {}: {}", location.display(), e);
        }
    }

    fn to_dto(&self, file: File) -> FileDto {
        let url = self
            .storage
            .public_url(&file.disk, &file.path)
            .unwrap_or_else(|e| {
                warn!("No URL for file {}: {}", file.id, e);
                None
            });
        FileDto { file, url }
    }
}
