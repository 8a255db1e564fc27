//! Upload processing
//!
//! Saves an uploaded original into a directory and runs the packages of a
//! named handling script over it. Packages may attach properties to the
//! original (checksum) or write derived files next to it (compressed copy,
//! text preview).

mod handler;
mod packages;
mod scripts;

pub use handler::FileHandler;
pub use scripts::{CompressConfig, HandlingScript, PackageConfig, PreviewConfig, ScriptRegistry};

use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlingError {
    #[error("Unknown handling script '{0}'")]
    UnknownScript(String),

    #[error("Invalid handling script '{script}': {reason}")]
    InvalidScript { script: String, reason: String },

    #[error("Invalid handler parameter {package}.{key}: {reason}")]
    InvalidParameter {
        package: String,
        key: String,
        reason: String,
    },

    #[error("File handler is not ready: {0}")]
    NotReady(&'static str),

    #[error("File handling I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-request package parameters, `package -> key -> value`
pub type HandlerParameters = HashMap<String, HashMap<String, String>>;

/// Properties a package attaches to a file, stored as the record's `options`
pub type AdditionalProperties = serde_json::Map<String, serde_json::Value>;

/// What the client told us about the upload
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileInfo {
    pub filename: String,
    pub title: String,
    pub mime: String,
    pub extension: String,
}

/// Properties measured on a file written by the handler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BasicProperties {
    pub mime: String,
    pub extension: String,
    pub size: i64,
}

/// A derived file written next to the original
#[derive(Debug, Clone, Default)]
pub struct GeneratedFile {
    pub basic: BasicProperties,
    pub additional: AdditionalProperties,
}

/// Collect `handler_parameters[pkg][key]` (or `handler_parameters.pkg.key`)
/// form fields into [`HandlerParameters`]. Returns `false` when `field` is not
/// a handler parameter.
pub fn collect_parameter(params: &mut HandlerParameters, field: &str, value: String) -> bool {
    let Some(rest) = field.strip_prefix("handler_parameters") else {
        return false;
    };

    let parts: Option<(&str, &str)> = if let Some(rest) = rest.strip_prefix('[') {
        rest.strip_suffix(']')
            .and_then(|inner| inner.split_once("]["))
    } else {
        rest.strip_prefix('.').and_then(|inner| inner.split_once('.'))
    };

    match parts {
        Some((package, key)) if !package.is_empty() && !key.is_empty() => {
            params
                .entry(package.to_string())
                .or_default()
                .insert(key.to_string(), value);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_parameter_bracket_and_dot_forms() {
        let mut params = HandlerParameters::new();

        assert!(collect_parameter(
            &mut params,
            "handler_parameters[compress][level]",
            "9".to_string()
        ));
        assert!(collect_parameter(
            &mut params,
            "handler_parameters.preview.enabled",
            "0".to_string()
        ));

        assert_eq!(params["compress"]["level"], "9");
        assert_eq!(params["preview"]["enabled"], "0");
    }

    #[test]
    fn test_collect_parameter_ignores_other_fields() {
        let mut params = HandlerParameters::new();

        assert!(!collect_parameter(&mut params, "title", "x".to_string()));
        assert!(!collect_parameter(
            &mut params,
            "handler_parameters[compress]",
            "x".to_string()
        ));
        assert!(!collect_parameter(
            &mut params,
            "handler_parameters[][level]",
            "x".to_string()
        ));
        assert!(params.is_empty());
    }
}
