use std::io::{self, Write};
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use flate2::{write::GzEncoder, Compression};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{
    AdditionalProperties, BasicProperties, CompressConfig, GeneratedFile, HandlingError,
    PreviewConfig,
};
use crate::modules::naming::{with_suffix, MAX_ATTEMPTS};

/// Result of running one package
pub(super) enum PackageOutput {
    /// Property merged into the original's additional properties
    Property(String, Value),
    /// Derived file written next to the original, keyed by its relative path
    Generated(String, GeneratedFile),
    Skipped,
}

pub(super) fn checksum(data: &[u8]) -> PackageOutput {
    let digest = Sha256::digest(data);
    PackageOutput::Property(
        "checksum".to_string(),
        json!({ "algorithm": "sha256", "value": hex::encode(digest) }),
    )
}

pub(super) async fn compress(
    config: &CompressConfig,
    data: Bytes,
    directory: &Path,
    source: &str,
) -> Result<PackageOutput, HandlingError> {
    let original_size = data.len() as u64;
    if original_size < config.min_size {
        return Ok(PackageOutput::Skipped);
    }

    let level = config.level;
    let encoded = tokio::task::spawn_blocking(move || -> io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
        encoder.write_all(&data)?;
        encoder.finish()
    })
    .await
    .map_err(io::Error::other)??;

    let (name, size) = write_free(directory, &format!("{}.gz", source), &encoded).await?;

    let mut additional = AdditionalProperties::new();
    additional.insert("source".to_string(), json!(source));
    additional.insert("level".to_string(), json!(level));
    additional.insert("original_size".to_string(), json!(original_size));

    Ok(PackageOutput::Generated(
        name,
        GeneratedFile {
            basic: BasicProperties {
                mime: "application/gzip".to_string(),
                extension: "gz".to_string(),
                size,
            },
            additional,
        },
    ))
}

pub(super) async fn preview(
    config: &PreviewConfig,
    data: &[u8],
    directory: &Path,
    source: &str,
) -> Result<PackageOutput, HandlingError> {
    let end = utf8_boundary(data, config.max_bytes);
    let excerpt = String::from_utf8_lossy(&data[..end]);
    // Replacement characters can grow invalid input past the limit
    let excerpt = excerpt.as_bytes();
    let excerpt = &excerpt[..utf8_boundary(excerpt, config.max_bytes)];

    let (name, size) = write_free(directory, &preview_name(source), excerpt).await?;

    let mut additional = AdditionalProperties::new();
    additional.insert("source".to_string(), json!(source));
    additional.insert("truncated".to_string(), json!(end < data.len()));

    Ok(PackageOutput::Generated(
        name,
        GeneratedFile {
            basic: BasicProperties {
                mime: "text/plain".to_string(),
                extension: "txt".to_string(),
                size,
            },
            additional,
        },
    ))
}

/// Largest cut at or below `max` that does not split a UTF-8 sequence
fn utf8_boundary(data: &[u8], max: usize) -> usize {
    let mut end = max.min(data.len());
    while end > 0 && end < data.len() && (data[end] & 0xC0) == 0x80 {
        end -= 1;
    }
    end
}

/// `dir/name.ext` -> `dir/name_preview.txt`
fn preview_name(source: &str) -> String {
    let path = Path::new(source);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let file = format!("{}_preview.txt", stem);

    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => PathBuf::from(parent).join(file).to_string_lossy().into_owned(),
        None => file,
    }
}

/// Write a file that must not exist yet; returns its size.
///
/// A partially written file is removed again.
pub(super) async fn write_new(path: &Path, data: &[u8]) -> io::Result<i64> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    let written = async {
        file.write_all(data).await?;
        file.flush().await
    }
    .await;
    if let Err(e) = written {
        drop(file);
        let _ = fs::remove_file(path).await;
        return Err(e);
    }
    Ok(data.len() as i64)
}

/// Write a derived file as `name`, or as the first free suffixed variant
/// (`name-1.ext`, `name-2.ext`, ...). Returns the name used and the size.
async fn write_free(directory: &Path, name: &str, data: &[u8]) -> io::Result<(String, i64)> {
    for attempt in 0..MAX_ATTEMPTS {
        let candidate = if attempt == 0 {
            name.to_string()
        } else {
            with_suffix(name, attempt)
        };

        match write_new(&directory.join(&candidate), data).await {
            Ok(size) => return Ok((candidate, size)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!("Derived file '{}' exists, retrying", candidate);
            }
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for '{}' after {} attempts", name, MAX_ATTEMPTS),
    ))
}
