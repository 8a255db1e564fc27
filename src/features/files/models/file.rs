use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

/// Database model for files
///
/// Originals have no `parent_id`; modifications point at their original.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct File {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub title: String,
    /// Name the file had on the client
    pub filename: Option<String>,
    pub mime: Option<String>,
    pub extension: Option<String>,
    /// Size in bytes
    pub size: Option<i64>,
    pub disk: String,
    /// Location relative to the disk root
    pub path: String,
    pub slug: Option<String>,
    pub published: bool,
    pub description: Option<String>,
    pub author_id: Option<i64>,
    /// Properties attached by the handling packages
    #[schema(value_type = Object)]
    pub options: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl File {
    pub fn is_modification(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Name offered when the file is downloaded
    pub fn download_name(&self) -> String {
        self.filename
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| self.path.rsplit('/').next().map(str::to_string))
            .unwrap_or_else(|| format!("file-{}", self.id))
    }
}

/// Values for a new file record
#[derive(Debug, Clone, Default)]
pub struct NewFile {
    pub parent_id: Option<i64>,
    pub title: String,
    pub filename: Option<String>,
    pub mime: Option<String>,
    pub extension: Option<String>,
    pub size: Option<i64>,
    pub disk: String,
    pub path: String,
    pub slug: Option<String>,
    pub published: bool,
    pub description: Option<String>,
    pub author_id: Option<i64>,
    pub options: serde_json::Value,
}

/// Editable columns; `None` leaves a column as it is.
///
/// `description` and `slug` are doubly optional so that they can be cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub published: Option<bool>,
    pub slug: Option<Option<String>>,
}

impl FileUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.published.is_none()
            && self.slug.is_none()
    }
}
