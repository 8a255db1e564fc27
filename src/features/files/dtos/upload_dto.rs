use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
};
use tracing::debug;
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::core::error::AppError;
use crate::modules::file_handling::{collect_parameter, HandlerParameters};
use crate::shared::constants::{MAX_DESCRIPTION_LENGTH, MAX_TITLE_LENGTH};
use crate::shared::validation::{non_empty, parse_flag, validate_slug};

/// Upload form for OpenAPI documentation
/// Note: This struct is for Swagger UI documentation only.
/// The handlers read the body through the [`UploadForm`] extractor.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadFileDto {
    /// The file to upload
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// Title; an empty value uses the filename without its extension
    #[schema(example = "Annual report")]
    pub title: String,
    pub description: Option<String>,
    /// "1" to allow downloads through the public link
    #[schema(example = "1")]
    pub published: Option<String>,
    #[schema(example = "annual-report")]
    pub slug: Option<String>,
    /// Per-package parameters, sent as `handler_parameters[<package>][<key>]`
    #[schema(example = json!({"compress": {"level": "9"}, "preview": {"enabled": "0"}}))]
    pub handler_parameters: Option<serde_json::Value>,
}

/// File part of an upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Multipart upload as sent by the create form and `POST /api/files`
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    /// `None` when the field was not sent at all
    pub title: Option<String>,
    pub description: Option<String>,
    pub published: Option<String>,
    pub slug: Option<String>,
    pub handler_parameters: HandlerParameters,
    /// A `file` field arrived as plain text
    file_sent_as_text: bool,
}

impl UploadForm {
    /// Title to store, falling back to `derived` when the field is blank
    pub fn title_or(&self, derived: &str) -> String {
        non_empty(self.title.clone()).unwrap_or_else(|| derived.to_string())
    }

    pub fn description(&self) -> Option<String> {
        non_empty(self.description.clone())
    }

    pub fn is_published(&self) -> bool {
        self.published
            .as_deref()
            .and_then(parse_flag)
            .unwrap_or(false)
    }

    pub fn slug(&self) -> Option<String> {
        non_empty(self.slug.clone())
    }

    #[cfg(test)]
    pub fn with_file(filename: &str, content_type: Option<&str>, data: &'static [u8]) -> Self {
        Self {
            file: Some(UploadedFile {
                filename: filename.to_string(),
                content_type: content_type.map(str::to_string),
                data: Bytes::from_static(data),
            }),
            title: Some(String::new()),
            ..Default::default()
        }
    }
}

impl Validate for UploadForm {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.file.is_none() {
            let code = if self.file_sent_as_text { "file" } else { "required" };
            errors.add("file", ValidationError::new(code));
        }

        match &self.title {
            None => errors.add("title", ValidationError::new("required")),
            Some(title) if title.chars().count() as u64 > MAX_TITLE_LENGTH => {
                errors.add("title", ValidationError::new("length"))
            }
            Some(_) => {}
        }

        if let Some(description) = &self.description {
            if description.chars().count() as u64 > MAX_DESCRIPTION_LENGTH {
                errors.add("description", ValidationError::new("length"));
            }
        }

        if let Some(published) = &self.published {
            if !published.trim().is_empty() && parse_flag(published).is_none() {
                errors.add("published", ValidationError::new("boolean"));
            }
        }

        if let Some(slug) = &self.slug {
            if let Err(error) = validate_slug(slug.trim()) {
                errors.add("slug", error);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl<S> FromRequest<S> for UploadForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid multipart form: {}", e.body_text())))?;

        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await.map_err(|e| {
            debug!("Failed to read multipart field: {}", e);
            AppError::BadRequest(format!("Failed to read multipart data: {}", e))
        })? {
            let name = field.name().unwrap_or_default().to_string();

            if name == "file" {
                // Browsers send an empty filename when nothing was chosen
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|e| {
                    debug!("Failed to read file bytes: {}", e);
                    AppError::BadRequest(format!("Failed to read file data: {}", e))
                })?;

                match filename {
                    Some(filename) if !filename.is_empty() => {
                        form.file = Some(UploadedFile {
                            filename,
                            content_type,
                            data,
                        });
                    }
                    Some(_) => {}
                    None => form.file_sent_as_text = true,
                }
                continue;
            }

            let value = field.text().await.map_err(|e| {
                AppError::BadRequest(format!("Failed to read field '{}': {}", name, e))
            })?;

            match name.as_str() {
                "title" => form.title = Some(value),
                "description" => form.description = Some(value),
                "published" => form.published = Some(value),
                "slug" => form.slug = Some(value),
                other => {
                    if !collect_parameter(&mut form.handler_parameters, other, value) {
                        debug!("Ignoring unknown field: {}", other);
                    }
                }
            }
        }

        Ok(form)
    }
}
