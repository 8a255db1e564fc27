use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::core::error::{AppError, Result};
use crate::features::files::FilesState;

const OCTET_STREAM: &str = "application/octet-stream";

/// Download a published file by its public link
pub async fn download(
    State(state): State<FilesState>,
    Path(slug): Path<String>,
) -> Result<Response> {
    let (file, location) = state.files.find_published(&slug).await?;

    let data = tokio::fs::read(&location).await.map_err(|e| {
        warn!(
            "Published file {} is missing at {}: {}",
            file.id,
            location.display(),
            e
        );
        AppError::NotFound(format!("No published file for '{}'", slug))
    })?;

    let mime = file.mime.clone().unwrap_or_else(|| OCTET_STREAM.to_string());

    Ok((
        [
            (header::CONTENT_TYPE, mime),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&file.download_name()),
            ),
        ],
        data,
    )
        .into_response())
}

/// `attachment` with an ASCII fallback and the RFC 5987 UTF-8 name
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}
