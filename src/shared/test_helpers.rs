use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use tempfile::TempDir;

use crate::core::config::StorageConfig;
use crate::core::error::Result;
use crate::features::files::dtos::{FileQueryParams, SortDirection};
use crate::features::files::models::{File, FileUpdate, NewFile};
use crate::features::files::repositories::FileRepository;
use crate::features::files::services::{FileService, UploadService, UploadSettings};
use crate::features::files::{self, FilesState};
use crate::modules::file_handling::ScriptRegistry;
use crate::modules::naming::{NameGenerator, NameSeed, NamingError};
use crate::modules::storage::{DiskRegistry, StorageAdapter};
use crate::shared::flash::FlashStore;
use crate::shared::views::ViewRenderer;

/// File repository kept in memory, mirroring the PostgreSQL queries
#[derive(Default)]
pub struct InMemoryFileRepository {
    rows: Mutex<Vec<File>>,
    next_id: AtomicI64,
}

impl InMemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record, in insertion order
    pub fn all(&self) -> Vec<File> {
        self.rows.lock().unwrap().clone()
    }

    fn to_row(&self, file: NewFile) -> File {
        let now = Utc::now();
        File {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            parent_id: file.parent_id,
            title: file.title,
            filename: file.filename,
            mime: file.mime,
            extension: file.extension,
            size: file.size,
            disk: file.disk,
            path: file.path,
            slug: file.slug,
            published: file.published,
            description: file.description,
            author_id: file.author_id,
            options: file.options,
            created_at: now,
            updated_at: now,
        }
    }
}

fn contains_ignore_case(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

fn matches_filter(file: &File, params: &FileQueryParams) -> bool {
    if file.parent_id.is_some() {
        return false;
    }
    if let Some(search) = params.search_term() {
        let found = contains_ignore_case(Some(file.title.as_str()), search)
            || contains_ignore_case(file.filename.as_deref(), search)
            || contains_ignore_case(file.description.as_deref(), search);
        if !found {
            return false;
        }
    }
    if let Some(prefix) = params.mime_prefix() {
        let mime = file.mime.as_deref().unwrap_or_default().to_lowercase();
        if !mime.starts_with(&prefix.to_lowercase()) {
            return false;
        }
    }
    params
        .published
        .map_or(true, |published| file.published == published)
}

#[async_trait]
impl FileRepository for InMemoryFileRepository {
    async fn create(&self, file: NewFile) -> Result<File> {
        let row = self.to_row(file);
        self.rows.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn create_modifications(&self, files: Vec<NewFile>) -> Result<Vec<File>> {
        let created: Vec<File> = files.into_iter().map(|f| self.to_row(f)).collect();
        self.rows.lock().unwrap().extend(created.iter().cloned());
        Ok(created)
    }

    async fn find(&self, id: i64) -> Result<Option<File>> {
        Ok(self.all().into_iter().find(|f| f.id == id))
    }

    async fn modifications(&self, parent_id: i64) -> Result<Vec<File>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|f| f.parent_id == Some(parent_id))
            .collect())
    }

    async fn count_modifications(&self, parent_id: i64) -> Result<i64> {
        Ok(self.modifications(parent_id).await?.len() as i64)
    }

    async fn list(&self, params: &FileQueryParams) -> Result<(Vec<File>, i64)> {
        let mut matching: Vec<File> = self
            .all()
            .into_iter()
            .filter(|f| matches_filter(f, params))
            .collect();

        matching.sort_by_key(|f| (f.created_at, f.id));
        if params.sort == SortDirection::Desc {
            matching.reverse();
        }

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.limit() as usize)
            .collect();
        Ok((page, total))
    }

    async fn find_published_by_slug(&self, slug: &str) -> Result<Option<File>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|f| f.published && f.slug.as_deref() == Some(slug))
            .max_by_key(|f| (f.updated_at, f.id)))
    }

    async fn update(&self, id: i64, changes: &FileUpdate) -> Result<Option<File>> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|f| f.id == id) else {
            return Ok(None);
        };

        if let Some(title) = &changes.title {
            row.title = title.clone();
        }
        if let Some(description) = &changes.description {
            row.description = description.clone();
        }
        if let Some(published) = changes.published {
            row.published = published;
        }
        if let Some(slug) = &changes.slug {
            row.slug = slug.clone();
        }
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn delete_with_modifications(&self, id: i64) -> Result<Vec<File>> {
        let mut rows = self.rows.lock().unwrap();
        let (deleted, kept): (Vec<File>, Vec<File>) = rows
            .drain(..)
            .partition(|f| f.id == id || f.parent_id == Some(id));
        *rows = kept;
        Ok(deleted)
    }
}

/// Hands out `upload-1.<ext>`, `upload-2.<ext>`, ... without looking at the disk
#[derive(Default)]
pub struct SequentialNameGenerator {
    counter: AtomicUsize,
}

impl SequentialNameGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NameGenerator for SequentialNameGenerator {
    fn generate_name(
        &self,
        seed: &NameSeed,
        _directory: &Path,
    ) -> std::result::Result<String, NamingError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(if seed.extension.is_empty() {
            format!("upload-{}", n)
        } else {
            format!("upload-{}.{}", n, seed.extension)
        })
    }
}

/// Disk registry rooted in a fresh temporary directory
pub fn test_storage() -> (TempDir, Arc<dyn StorageAdapter>) {
    let temp_dir = TempDir::new().unwrap();
    let disks = DiskRegistry::from_config(&StorageConfig {
        root: temp_dir.path().to_path_buf(),
        public_url: "/storage".to_string(),
    });
    disks.ensure_directories().unwrap();
    (temp_dir, Arc::new(disks))
}

/// The files router wired to in-memory collaborators
pub struct TestApp {
    pub router: Router,
    pub repository: Arc<InMemoryFileRepository>,
    pub storage_dir: TempDir,
}

pub fn test_app() -> TestApp {
    let (storage_dir, storage) = test_storage();
    let repository = Arc::new(InMemoryFileRepository::new());

    let file_service = FileService::new(repository.clone(), storage.clone());
    let upload_service = UploadService::new(
        repository.clone(),
        storage,
        Arc::new(SequentialNameGenerator::new()),
        Arc::new(ScriptRegistry::builtin()),
        UploadSettings {
            disk: "public".to_string(),
            handling_script: "user-device".to_string(),
            author_id: 1,
        },
    );

    let state = FilesState {
        files: Arc::new(file_service),
        uploads: Arc::new(upload_service),
        views: Arc::new(ViewRenderer::new().unwrap()),
        flashes: Arc::new(FlashStore::new()),
    };

    TestApp {
        router: files::admin_routes(state.clone()).merge(files::public_routes(state)),
        repository,
        storage_dir,
    }
}
