use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use tracing::{debug, warn};

use super::packages::{self, PackageOutput};
use super::{
    AdditionalProperties, BasicProperties, FileInfo, GeneratedFile, HandlerParameters,
    HandlingError, HandlingScript, PackageConfig, ScriptRegistry,
};
use crate::modules::storage::is_contained;

/// Saves one upload and runs a handling script over it.
///
/// A handler is configured per upload: original bytes, target directory and
/// script first, then [`save`](Self::save), then [`handle`](Self::handle).
pub struct FileHandler {
    scripts: Arc<ScriptRegistry>,
    original: Option<(Bytes, FileInfo)>,
    directory: Option<PathBuf>,
    script: Option<HandlingScript>,
    saved_as: Option<String>,
    basic: BasicProperties,
    additional: AdditionalProperties,
    generated: BTreeMap<String, GeneratedFile>,
}

impl FileHandler {
    pub fn new(scripts: Arc<ScriptRegistry>) -> Self {
        Self {
            scripts,
            original: None,
            directory: None,
            script: None,
            saved_as: None,
            basic: BasicProperties::default(),
            additional: AdditionalProperties::new(),
            generated: BTreeMap::new(),
        }
    }

    pub fn set_original_file(&mut self, data: Bytes, info: FileInfo) {
        self.original = Some((data, info));
    }

    pub fn set_directory(&mut self, directory: impl Into<PathBuf>) {
        self.directory = Some(directory.into());
    }

    pub fn set_handling_script_by_script_name(&mut self, name: &str) -> Result<(), HandlingError> {
        self.script = Some(self.scripts.get(name)?.clone());
        Ok(())
    }

    /// Write the original as `filename` inside the directory.
    ///
    /// Never overwrites an existing file. Any failure is logged and reported
    /// as `false`.
    pub async fn save(&mut self, filename: &str) -> bool {
        let (Some((data, info)), Some(directory)) = (&self.original, &self.directory) else {
            warn!("File handler asked to save before it was configured");
            return false;
        };

        if !is_contained(Path::new(filename)) {
            warn!("Refusing to save upload under '{}'", filename);
            return false;
        }

        match packages::write_new(&directory.join(filename), data).await {
            Ok(size) => {
                debug!("Saved upload as {} ({} bytes)", filename, size);
                self.basic = BasicProperties {
                    mime: info.mime.clone(),
                    extension: info.extension.clone(),
                    size,
                };
                self.saved_as = Some(filename.to_string());
                true
            }
            Err(e) => {
                warn!("Failed to save upload as {}: {}", filename, e);
                false
            }
        }
    }

    /// Resolve every package of the script against `params`
    fn resolve_packages(
        &self,
        params: &HandlerParameters,
    ) -> Result<Vec<PackageConfig>, HandlingError> {
        let script = self
            .script
            .as_ref()
            .ok_or(HandlingError::NotReady("no handling script selected"))?;

        let mut resolved = Vec::with_capacity(script.packages.len());
        for package in &script.packages {
            if let Some(config) = package.with_parameters(params.get(package.name()))? {
                resolved.push(config);
            }
        }

        for name in params.keys() {
            if !script.packages.iter().any(|p| p.name() == name.as_str()) {
                debug!(
                    "Ignoring parameters for package '{}' not in script '{}'",
                    name, script.name
                );
            }
        }

        Ok(resolved)
    }

    pub fn validate_parameters(&self, params: &HandlerParameters) -> Result<(), HandlingError> {
        self.resolve_packages(params).map(|_| ())
    }

    /// Run the enabled packages whose mime rules match the saved original.
    ///
    /// Generated files are recorded as soon as they are written, so
    /// [`file_paths`](Self::file_paths) lists them even when a later package
    /// fails.
    pub async fn handle(&mut self, params: &HandlerParameters) -> Result<(), HandlingError> {
        let enabled = self.resolve_packages(params)?;

        let (Some((data, info)), Some(directory), Some(source)) =
            (&self.original, &self.directory, &self.saved_as)
        else {
            return Err(HandlingError::NotReady("original file has not been saved"));
        };

        for package in enabled.iter().filter(|p| p.applies_to(&info.mime)) {
            let output = match package {
                PackageConfig::Checksum(_) => packages::checksum(data),
                PackageConfig::Compress(config) => {
                    packages::compress(config, data.clone(), directory, source).await?
                }
                PackageConfig::Preview(config) => {
                    packages::preview(config, data, directory, source).await?
                }
            };

            match output {
                PackageOutput::Property(key, value) => {
                    self.additional.insert(key, value);
                }
                PackageOutput::Generated(path, file) => {
                    debug!("Package '{}' wrote {}", package.name(), path);
                    self.generated.insert(path, file);
                }
                PackageOutput::Skipped => {
                    debug!("Package '{}' skipped {}", package.name(), source);
                }
            }
        }

        Ok(())
    }

    /// Mime, extension and size of the saved original
    pub fn basic_file_properties(&self) -> &BasicProperties {
        &self.basic
    }

    pub fn additional_file_properties(&self) -> &AdditionalProperties {
        &self.additional
    }

    /// Directory-relative paths of the generated files, in path order
    pub fn file_paths(&self) -> Vec<&str> {
        self.generated.keys().map(String::as_str).collect()
    }

    pub fn basic_properties(&self) -> BTreeMap<&str, &BasicProperties> {
        self.generated
            .iter()
            .map(|(path, file)| (path.as_str(), &file.basic))
            .collect()
    }

    pub fn additional_properties(&self) -> BTreeMap<&str, &AdditionalProperties> {
        self.generated
            .iter()
            .map(|(path, file)| (path.as_str(), &file.additional))
            .collect()
    }
}
