use serde::{de, Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::features::files::models::{File, FileUpdate};
use crate::shared::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::shared::validation::{parse_flag, validate_slug, validate_title};

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Desc,
    Asc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Query params for listing files
#[derive(Debug, Clone, Serialize, Deserialize, IntoParams)]
pub struct FileQueryParams {
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    #[param(minimum = 1)]
    pub page: i64,
    /// Items per page
    #[serde(default = "default_page_size")]
    #[param(minimum = 1, maximum = 100)]
    pub page_size: i64,
    /// Search in title, filename or description
    pub search: Option<String>,
    /// MIME type prefix, e.g. `image/`
    pub mime: Option<String>,
    /// Filter by publication flag
    #[serde(default, deserialize_with = "deserialize_optional_flag")]
    #[param(value_type = Option<bool>)]
    pub published: Option<bool>,
    /// Sort by upload time (default: desc)
    #[serde(default)]
    pub sort: SortDirection,
}

impl FileQueryParams {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.limit())
    }

    pub fn limit(&self) -> i64 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    /// Number of pages needed for `total` items, at least one
    pub fn pages(&self, total: i64) -> i64 {
        ((total + self.limit() - 1) / self.limit()).max(1)
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn mime_prefix(&self) -> Option<&str> {
        self.mime.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Query string for `page` that keeps the current filters
    pub fn page_query(&self, page: i64) -> String {
        let mut pairs = Vec::new();
        if let Some(search) = self.search_term() {
            pairs.push(format!("search={}", urlencoding::encode(search)));
        }
        if let Some(mime) = self.mime_prefix() {
            pairs.push(format!("mime={}", urlencoding::encode(mime)));
        }
        if let Some(published) = self.published {
            pairs.push(format!("published={}", published));
        }
        if self.sort != SortDirection::default() {
            pairs.push(format!("sort={}", self.sort.as_sql().to_lowercase()));
        }
        if self.page_size != DEFAULT_PAGE_SIZE {
            pairs.push(format!("page_size={}", self.limit()));
        }
        pairs.push(format!("page={}", page));
        pairs.join("&")
    }
}

impl Default for FileQueryParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
            search: None,
            mime: None,
            published: None,
            sort: SortDirection::default(),
        }
    }
}

/// `?flash=<id>` on pages that a redirect may land on
#[derive(Debug, Default, Deserialize)]
pub struct FlashQuery {
    pub flash: Option<Uuid>,
}

/// Editable file information.
///
/// Used by the edit form and the JSON API. Only fields that are present
/// change; an empty description or slug clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateFileDto {
    #[validate(required, custom(function = "validate_title"))]
    #[schema(example = "Annual report")]
    pub title: Option<String>,

    #[validate(length(max = 5000))]
    pub description: Option<String>,

    /// Allow downloads through the public link
    #[serde(default, deserialize_with = "deserialize_optional_flag")]
    pub published: Option<bool>,

    /// Public link name; empty to remove it
    #[validate(custom(function = "validate_slug"))]
    #[schema(example = "annual-report")]
    pub slug: Option<String>,
}

impl UpdateFileDto {
    pub fn into_update(self) -> FileUpdate {
        fn clearable(value: Option<String>) -> Option<Option<String>> {
            value.map(|v| {
                let v = v.trim().to_string();
                (!v.is_empty()).then_some(v)
            })
        }

        FileUpdate {
            title: self.title.map(|t| t.trim().to_string()),
            description: clearable(self.description),
            published: self.published,
            slug: clearable(self.slug),
        }
    }
}

/// Body of the edit page forms, which can only POST
#[derive(Debug, Deserialize)]
pub struct MethodOverrideForm {
    #[serde(rename = "_method")]
    pub method: String,
    #[serde(flatten)]
    pub fields: UpdateFileDto,
}

/// File with the URL it is served under, if its disk is public
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FileDto {
    #[serde(flatten)]
    pub file: File,
    pub url: Option<String>,
}

/// Original file and the files derived from it
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FileDetailDto {
    pub file: FileDto,
    pub modifications: Vec<FileDto>,
}

/// Accepts booleans, checkbox values ("on", "1", "0", ...) and blanks
fn deserialize_optional_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Bool(value)) => Ok(Some(value)),
        Some(Raw::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Raw::Text(text)) => parse_flag(&text)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid flag value '{}'", text))),
    }
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}
