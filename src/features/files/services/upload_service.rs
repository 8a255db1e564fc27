use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::error::{AppError, Result};
use crate::features::files::dtos::{UploadForm, UploadedFile};
use crate::features::files::models::{File, NewFile};
use crate::features::files::repositories::FileRepository;
use crate::modules::file_handling::{FileHandler, FileInfo, ScriptRegistry};
use crate::modules::naming::{NameGenerator, NameSeed};
use crate::modules::storage::StorageAdapter;

const OCTET_STREAM: &str = "application/octet-stream";

/// Where uploads go and how they are processed
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub disk: String,
    pub handling_script: String,
    pub author_id: i64,
}

/// Result of storing an upload
#[derive(Debug)]
pub enum StoreOutcome {
    Saved {
        file: File,
        modifications: Vec<File>,
    },
    /// The handler could not write the original; nothing was persisted
    NotSaved(FileInfo),
}

/// Runs the upload pipeline: naming, saving, handling, persisting
pub struct UploadService {
    repository: Arc<dyn FileRepository>,
    storage: Arc<dyn StorageAdapter>,
    names: Arc<dyn NameGenerator>,
    scripts: Arc<ScriptRegistry>,
    settings: UploadSettings,
}

impl UploadService {
    pub fn new(
        repository: Arc<dyn FileRepository>,
        storage: Arc<dyn StorageAdapter>,
        names: Arc<dyn NameGenerator>,
        scripts: Arc<ScriptRegistry>,
        settings: UploadSettings,
    ) -> Self {
        Self {
            repository,
            storage,
            names,
            scripts,
            settings,
        }
    }

    /// Store a validated upload with the modifications its handling produced
    pub async fn store(&self, form: UploadForm) -> Result<StoreOutcome> {
        let upload = form
            .file
            .as_ref()
            .ok_or_else(|| AppError::BadRequest("File is required".to_string()))?;
        let info = file_info(upload);

        let directory = self.storage.path_prefix(&self.settings.disk)?;
        let seed = NameSeed {
            mime: info.mime.clone(),
            extension: info.extension.clone(),
            filename: info.filename.clone(),
        };
        let filename = self.names.generate_name(&seed, &directory)?;
        debug!("Generated name {} for upload {}", filename, info.filename);

        let mut handler = FileHandler::new(self.scripts.clone());
        handler.set_original_file(upload.data.clone(), info.clone());
        handler.set_directory(&directory);
        handler.set_handling_script_by_script_name(&self.settings.handling_script)?;
        handler.validate_parameters(&form.handler_parameters)?;

        if !handler.save(&filename).await {
            warn!("Upload {} was not saved", info.filename);
            return Ok(StoreOutcome::NotSaved(info));
        }

        if let Err(e) = handler.handle(&form.handler_parameters).await {
            discard(&directory, std::iter::once(filename.as_str()).chain(handler.file_paths()))
                .await;
            return Err(e.into());
        }

        let basic = handler.basic_file_properties();
        let file = self
            .repository
            .create(NewFile {
                parent_id: None,
                title: form.title_or(&info.title),
                filename: Some(info.filename.clone()),
                mime: Some(basic.mime.clone()),
                extension: Some(basic.extension.clone()),
                size: Some(basic.size),
                disk: self.settings.disk.clone(),
                path: filename.clone(),
                slug: form.slug(),
                published: form.is_published(),
                description: form.description(),
                author_id: Some(self.settings.author_id),
                options: Value::Object(handler.additional_file_properties().clone()),
            })
            .await?;

        let basic_properties = handler.basic_properties();
        let additional_properties = handler.additional_properties();
        let pending: Vec<NewFile> = handler
            .file_paths()
            .into_iter()
            .map(|path| {
                let basic = basic_properties.get(path);
                NewFile {
                    parent_id: Some(file.id),
                    title: format!("{} [{}]", file.title, file.id),
                    filename: None,
                    mime: basic.map(|b| b.mime.clone()),
                    extension: basic.map(|b| b.extension.clone()),
                    size: basic.map(|b| b.size),
                    disk: file.disk.clone(),
                    path: path.to_string(),
                    slug: None,
                    published: false,
                    description: None,
                    author_id: file.author_id,
                    options: additional_properties
                        .get(path)
                        .map(|a| Value::Object((*a).clone()))
                        .unwrap_or_else(|| Value::Object(Default::default())),
                }
            })
            .collect();

        let modifications = self.repository.create_modifications(pending).await?;

        info!(
            "Stored file {} as {}:{} with {} modification(s)",
            file.id,
            file.disk,
            file.path,
            modifications.len()
        );

        Ok(StoreOutcome::Saved {
            file,
            modifications,
        })
    }
}

/// Title, mime and extension for an upload.
///
/// The mime falls back to a guess from the filename when the client sent
/// none or a generic one; the extension falls back to one known for the mime.
pub fn file_info(upload: &UploadedFile) -> FileInfo {
    let path = Path::new(&upload.filename);
    let title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let mime = upload
        .content_type
        .as_deref()
        .map(str::trim)
        .filter(|ct| !ct.is_empty() && !ct.eq_ignore_ascii_case(OCTET_STREAM))
        .map(str::to_string)
        .unwrap_or_else(|| {
            mime_guess::from_path(&upload.filename)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .or_else(|| {
            mime_guess::get_mime_extensions_str(&mime)
                .and_then(|extensions| extensions.first())
                .map(|e| e.to_string())
        })
        .unwrap_or_default();

    FileInfo {
        filename: upload.filename.clone(),
        title,
        mime,
        extension,
    }
}

async fn discard<'a>(directory: &Path, paths: impl Iterator<Item = &'a str>) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(directory.join(path)).await {
            debug!("Could not discard {}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::file_handling::HandlerParameters;
    use crate::modules::naming::{PatternNameGenerator, MAX_ATTEMPTS};
    use crate::shared::test_helpers::{test_storage, InMemoryFileRepository, SequentialNameGenerator};
    use std::collections::HashMap;

    fn service(
        repository: Arc<InMemoryFileRepository>,
        storage: Arc<dyn StorageAdapter>,
    ) -> UploadService {
        service_with_names(repository, storage, Arc::new(SequentialNameGenerator::new()))
    }

    fn service_with_names(
        repository: Arc<InMemoryFileRepository>,
        storage: Arc<dyn StorageAdapter>,
        names: Arc<dyn NameGenerator>,
    ) -> UploadService {
        UploadService::new(
            repository,
            storage,
            names,
            Arc::new(ScriptRegistry::builtin()),
            UploadSettings {
                disk: "public".to_string(),
                handling_script: "user-device".to_string(),
                author_id: 1,
            },
        )
    }

    #[test]
    fn test_file_info_from_client_metadata() {
        let info = file_info(&UploadedFile {
            filename: "photo.jpg".to_string(),
            content_type: Some("image/jpeg".to_string()),
            data: Default::default(),
        });
        assert_eq!(info.title, "photo");
        assert_eq!(info.mime, "image/jpeg");
        assert_eq!(info.extension, "jpg");
    }

    #[test]
    fn test_file_info_guesses_missing_metadata() {
        let info = file_info(&UploadedFile {
            filename: "Notes.TXT".to_string(),
            content_type: Some("application/octet-stream".to_string()),
            data: Default::default(),
        });
        assert_eq!(info.title, "Notes");
        assert_eq!(info.mime, "text/plain");
        assert_eq!(info.extension, "txt");

        let info = file_info(&UploadedFile {
            filename: "scan".to_string(),
            content_type: Some("application/pdf".to_string()),
            data: Default::default(),
        });
        assert_eq!(info.title, "scan");
        assert_eq!(info.extension, "pdf");
    }

    #[tokio::test]
    async fn test_store_image_without_modifications() {
        let (temp_dir, storage) = test_storage();
        let repository = Arc::new(InMemoryFileRepository::new());
        let service = service(repository.clone(), storage);

        let form = UploadForm::with_file("photo.jpg", Some("image/jpeg"), b"\xff\xd8\xff");
        let StoreOutcome::Saved {
            file,
            modifications,
        } = service.store(form).await.unwrap()
        else {
            panic!("upload should be saved");
        };

        assert_eq!(file.title, "photo");
        assert_eq!(file.extension.as_deref(), Some("jpg"));
        assert_eq!(file.mime.as_deref(), Some("image/jpeg"));
        assert_eq!(file.disk, "public");
        assert_eq!(file.size, Some(3));
        assert_eq!(file.author_id, Some(1));
        assert_eq!(file.options["checksum"]["algorithm"], "sha256");
        assert!(modifications.is_empty());
        assert!(temp_dir.path().join("public").join(&file.path).is_file());
        assert_eq!(repository.all().len(), 1);
    }

    #[tokio::test]
    async fn test_store_text_creates_titled_modification() {
        let (temp_dir, storage) = test_storage();
        let repository = Arc::new(InMemoryFileRepository::new());
        let service = service(repository.clone(), storage);

        let form = UploadForm::with_file("notes.txt", Some("text/plain"), b"remember the milk");
        let StoreOutcome::Saved {
            file,
            modifications,
        } = service.store(form).await.unwrap()
        else {
            panic!("upload should be saved");
        };

        assert_eq!(modifications.len(), 1);
        let preview = &modifications[0];
        assert_eq!(preview.parent_id, Some(file.id));
        assert_eq!(preview.title, format!("notes [{}]", file.id));
        assert_eq!(preview.disk, file.disk);
        assert_eq!(preview.author_id, file.author_id);
        assert_eq!(preview.mime.as_deref(), Some("text/plain"));
        assert_eq!(preview.options["source"], Value::String(file.path.clone()));
        assert!(temp_dir.path().join("public").join(&preview.path).is_file());
        assert_eq!(repository.all().len(), 2);
    }

    #[tokio::test]
    async fn test_store_not_saved_persists_nothing() {
        let (temp_dir, storage) = test_storage();
        let repository = Arc::new(InMemoryFileRepository::new());
        let service = service(repository.clone(), storage);

        // The sequential generator hands out upload-1.<ext> first
        std::fs::write(temp_dir.path().join("public/upload-1.txt"), b"taken").unwrap();

        let form = UploadForm::with_file("notes.txt", Some("text/plain"), b"hello");
        let outcome = service.store(form).await.unwrap();

        let StoreOutcome::NotSaved(info) = outcome else {
            panic!("upload should not be saved");
        };
        assert_eq!(info.filename, "notes.txt");
        assert!(repository.all().is_empty());
    }

    #[tokio::test]
    async fn test_store_rejects_invalid_parameters_before_saving() {
        let (temp_dir, storage) = test_storage();
        let repository = Arc::new(InMemoryFileRepository::new());
        let service = service(repository.clone(), storage);

        let mut form = UploadForm::with_file("notes.txt", Some("text/plain"), b"hello");
        form.handler_parameters = HandlerParameters::from([(
            "preview".to_string(),
            HashMap::from([("max_bytes".to_string(), "lots".to_string())]),
        )]);

        assert!(matches!(
            service.store(form).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(repository.all().is_empty());
        assert!(!temp_dir.path().join("public/upload-1.txt").exists());
    }

    #[tokio::test]
    async fn test_store_uses_client_fields() {
        let (_temp_dir, storage) = test_storage();
        let repository = Arc::new(InMemoryFileRepository::new());
        let service = service(repository, storage);

        let mut form = UploadForm::with_file("report.pdf", Some("application/pdf"), b"%PDF");
        form.title = Some("Annual report".to_string());
        form.description = Some("Numbers".to_string());
        form.published = Some("1".to_string());
        form.slug = Some("annual-report".to_string());

        let StoreOutcome::Saved { file, .. } = service.store(form).await.unwrap() else {
            panic!("upload should be saved");
        };
        assert_eq!(file.title, "Annual report");
        assert_eq!(file.description.as_deref(), Some("Numbers"));
        assert!(file.published);
        assert_eq!(file.slug.as_deref(), Some("annual-report"));
        assert_eq!(file.filename.as_deref(), Some("report.pdf"));
    }

    const REPORT: &[u8] = &[b'r'; 4096];

    #[tokio::test]
    async fn test_store_same_stem_twice_keeps_both_derived_sets() {
        let (temp_dir, storage) = test_storage();
        let repository = Arc::new(InMemoryFileRepository::new());
        let names = PatternNameGenerator::new("{filename}.{extension}").unwrap();
        let service = service_with_names(repository.clone(), storage, Arc::new(names));

        for (filename, mime) in [("report.txt", "text/plain"), ("report.csv", "text/csv")] {
            let form = UploadForm::with_file(filename, Some(mime), REPORT);
            assert!(matches!(
                service.store(form).await.unwrap(),
                StoreOutcome::Saved { .. }
            ));
        }

        let mut paths: Vec<String> = repository.all().into_iter().map(|f| f.path).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "report.csv",
                "report.csv.gz",
                "report.txt",
                "report.txt.gz",
                "report_preview-1.txt",
                "report_preview.txt",
            ]
        );
        for path in &paths {
            assert!(temp_dir.path().join("public").join(path).is_file(), "{}", path);
        }
    }

    #[tokio::test]
    async fn test_store_failed_handling_removes_written_files() {
        let (temp_dir, storage) = test_storage();
        let repository = Arc::new(InMemoryFileRepository::new());
        let service = service(repository.clone(), storage);

        // Leave no free name for the preview of upload-1.txt
        let public = temp_dir.path().join("public");
        std::fs::write(public.join("upload-1_preview.txt"), b"").unwrap();
        for attempt in 1..MAX_ATTEMPTS {
            std::fs::write(public.join(format!("upload-1_preview-{}.txt", attempt)), b"").unwrap();
        }

        let form = UploadForm::with_file("notes.txt", Some("text/plain"), REPORT);
        assert!(service.store(form).await.is_err());

        assert!(repository.all().is_empty());
        assert!(!public.join("upload-1.txt").exists());
        assert!(!public.join("upload-1.txt.gz").exists());
    }
}
