use std::collections::{HashMap, HashSet};

use super::HandlingError;
use crate::shared::validation::parse_flag;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumConfig {
    pub mimes: Vec<String>,
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            mimes: vec!["*/*".to_string()],
        }
    }
}

/// Gzip copy of the original, skipped below `min_size` bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressConfig {
    pub level: u32,
    pub min_size: u64,
    pub mimes: Vec<String>,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            level: 6,
            min_size: 1024,
            mimes: vec!["*/*".to_string()],
        }
    }
}

/// Plain text excerpt of the first `max_bytes` bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewConfig {
    pub max_bytes: usize,
    pub mimes: Vec<String>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_bytes: 2048,
            mimes: vec!["text/*".to_string()],
        }
    }
}

/// One processing step of a handling script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageConfig {
    Checksum(ChecksumConfig),
    Compress(CompressConfig),
    Preview(PreviewConfig),
}

impl PackageConfig {
    /// Name used for the package in handler parameters
    pub fn name(&self) -> &'static str {
        match self {
            PackageConfig::Checksum(_) => "checksum",
            PackageConfig::Compress(_) => "compress",
            PackageConfig::Preview(_) => "preview",
        }
    }

    pub fn mimes(&self) -> &[String] {
        match self {
            PackageConfig::Checksum(c) => &c.mimes,
            PackageConfig::Compress(c) => &c.mimes,
            PackageConfig::Preview(c) => &c.mimes,
        }
    }

    pub fn applies_to(&self, mime: &str) -> bool {
        self.mimes().iter().any(|pattern| mime_matches(pattern, mime))
    }

    fn check(&self) -> Result<(), String> {
        if self.mimes().is_empty() {
            return Err(format!("package '{}' has no mime rules", self.name()));
        }
        if let Some(bad) = self.mimes().iter().find(|p| !is_mime_pattern(p)) {
            return Err(format!(
                "package '{}' has invalid mime rule '{}'",
                self.name(),
                bad
            ));
        }
        match self {
            PackageConfig::Compress(c) if c.level > 9 => {
                Err(format!("compress level {} is outside 0-9", c.level))
            }
            PackageConfig::Preview(c) if c.max_bytes == 0 => {
                Err("preview max_bytes must be positive".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Apply request parameters on top of the configured values.
    ///
    /// Returns `Ok(None)` when the request disables the package. Blank values
    /// keep the configured default.
    pub fn with_parameters(
        &self,
        params: Option<&HashMap<String, String>>,
    ) -> Result<Option<PackageConfig>, HandlingError> {
        let mut config = self.clone();
        let Some(params) = params else {
            return Ok(Some(config));
        };

        let package = self.name();
        let invalid = |key: &str, reason: &str| HandlingError::InvalidParameter {
            package: package.to_string(),
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let mut keys: Vec<&String> = params.keys().collect();
        keys.sort();

        let mut enabled = true;
        for key in keys {
            let value = params[key].trim();
            if value.is_empty() {
                continue;
            }

            match (&mut config, key.as_str()) {
                (_, "enabled") => {
                    enabled = parse_flag(value).ok_or_else(|| invalid(key, "expected a flag"))?;
                }
                (PackageConfig::Compress(c), "level") => {
                    c.level = value
                        .parse::<u32>()
                        .ok()
                        .filter(|level| *level <= 9)
                        .ok_or_else(|| invalid(key, "expected an integer between 0 and 9"))?;
                }
                (PackageConfig::Compress(c), "min_size") => {
                    c.min_size = value
                        .parse()
                        .map_err(|_| invalid(key, "expected a byte count"))?;
                }
                (PackageConfig::Preview(c), "max_bytes") => {
                    c.max_bytes = value
                        .parse::<usize>()
                        .ok()
                        .filter(|max| *max > 0)
                        .ok_or_else(|| invalid(key, "expected a positive byte count"))?;
                }
                _ => return Err(invalid(key, "unknown parameter")),
            }
        }

        Ok(enabled.then_some(config))
    }
}

/// Named list of packages run over every upload it is selected for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlingScript {
    pub name: String,
    pub packages: Vec<PackageConfig>,
}

impl HandlingScript {
    pub fn new(name: impl Into<String>, packages: Vec<PackageConfig>) -> Self {
        Self {
            name: name.into(),
            packages,
        }
    }

    fn check(&self) -> Result<(), HandlingError> {
        let invalid = |reason: String| HandlingError::InvalidScript {
            script: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("script name is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for package in &self.packages {
            if !seen.insert(package.name()) {
                return Err(invalid(format!("package '{}' is listed twice", package.name())));
            }
            package.check().map_err(invalid)?;
        }
        Ok(())
    }
}

/// Handling scripts known to the application
#[derive(Debug, Clone, Default)]
pub struct ScriptRegistry {
    scripts: HashMap<String, HandlingScript>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `user-device` for uploads from the admin pages, `system` for
    /// files the application produces itself
    pub fn builtin() -> Self {
        Self::new()
            .with_script(HandlingScript::new(
                "user-device",
                vec![
                    PackageConfig::Checksum(ChecksumConfig::default()),
                    PackageConfig::Compress(CompressConfig {
                        mimes: vec![
                            "text/*".to_string(),
                            "application/json".to_string(),
                            "application/xml".to_string(),
                            "image/svg+xml".to_string(),
                        ],
                        ..Default::default()
                    }),
                    PackageConfig::Preview(PreviewConfig::default()),
                ],
            ))
            .with_script(HandlingScript::new(
                "system",
                vec![PackageConfig::Checksum(ChecksumConfig::default())],
            ))
    }

    pub fn with_script(mut self, script: HandlingScript) -> Self {
        self.scripts.insert(script.name.clone(), script);
        self
    }

    pub fn get(&self, name: &str) -> Result<&HandlingScript, HandlingError> {
        self.scripts
            .get(name)
            .ok_or_else(|| HandlingError::UnknownScript(name.to_string()))
    }

    /// Check every script; run once at startup
    pub fn validate(&self) -> Result<(), HandlingError> {
        let mut names: Vec<&String> = self.scripts.keys().collect();
        names.sort();
        for name in names {
            self.scripts[name].check()?;
        }
        Ok(())
    }
}

fn is_mime_pattern(pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.split_once('/') {
        Some((kind, subtype)) => {
            !kind.is_empty() && !subtype.is_empty() && !subtype.contains('/')
        }
        None => false,
    }
}

/// Match a mime type against `type/subtype`, where either side may be `*`
pub fn mime_matches(pattern: &str, mime: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let (Some((p_kind, p_sub)), Some((kind, sub))) = (pattern.split_once('/'), mime.split_once('/'))
    else {
        return false;
    };
    let sub = sub.split(';').next().unwrap_or_default().trim();

    (p_kind == "*" || p_kind.eq_ignore_ascii_case(kind))
        && (p_sub == "*" || p_sub.eq_ignore_ascii_case(sub))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_mime_matches() {
        assert!(mime_matches("*/*", "image/png"));
        assert!(mime_matches("*", "whatever"));
        assert!(mime_matches("text/*", "text/plain"));
        assert!(mime_matches("text/*", "TEXT/html; charset=utf-8"));
        assert!(mime_matches("application/json", "application/json"));
        assert!(!mime_matches("text/*", "image/png"));
        assert!(!mime_matches("application/json", "application/xml"));
        assert!(!mime_matches("text/*", "garbage"));
    }

    #[test]
    fn test_builtin_scripts_are_valid() {
        let registry = ScriptRegistry::builtin();
        assert!(registry.validate().is_ok());

        let names: Vec<&str> = registry
            .get("user-device")
            .unwrap()
            .packages
            .iter()
            .map(PackageConfig::name)
            .collect();
        assert_eq!(names, vec!["checksum", "compress", "preview"]);
        assert_eq!(registry.get("system").unwrap().packages.len(), 1);
        assert!(matches!(
            registry.get("nope"),
            Err(HandlingError::UnknownScript(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_scripts() {
        let duplicate = ScriptRegistry::new().with_script(HandlingScript::new(
            "twice",
            vec![
                PackageConfig::Checksum(ChecksumConfig::default()),
                PackageConfig::Checksum(ChecksumConfig::default()),
            ],
        ));
        assert!(matches!(
            duplicate.validate(),
            Err(HandlingError::InvalidScript { .. })
        ));

        let level = ScriptRegistry::new().with_script(HandlingScript::new(
            "level",
            vec![PackageConfig::Compress(CompressConfig {
                level: 12,
                ..Default::default()
            })],
        ));
        assert!(level.validate().is_err());

        let mime = ScriptRegistry::new().with_script(HandlingScript::new(
            "mime",
            vec![PackageConfig::Preview(PreviewConfig {
                mimes: vec!["text".to_string()],
                ..Default::default()
            })],
        ));
        assert!(mime.validate().is_err());

        let empty = ScriptRegistry::new().with_script(HandlingScript::new(" ", vec![]));
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_with_parameters_overrides_and_disables() {
        let compress = PackageConfig::Compress(CompressConfig::default());

        let tuned = compress
            .with_parameters(Some(&params(&[("level", "9"), ("min_size", "")])))
            .unwrap()
            .unwrap();
        assert_eq!(
            tuned,
            PackageConfig::Compress(CompressConfig {
                level: 9,
                ..Default::default()
            })
        );

        let disabled = compress
            .with_parameters(Some(&params(&[("enabled", "0")])))
            .unwrap();
        assert!(disabled.is_none());

        assert_eq!(compress.with_parameters(None).unwrap(), Some(compress.clone()));
    }

    #[test]
    fn test_with_parameters_rejects_invalid_values() {
        let compress = PackageConfig::Compress(CompressConfig::default());
        let preview = PackageConfig::Preview(PreviewConfig::default());
        let checksum = PackageConfig::Checksum(ChecksumConfig::default());

        assert!(matches!(
            compress.with_parameters(Some(&params(&[("level", "10")]))),
            Err(HandlingError::InvalidParameter { .. })
        ));
        assert!(preview
            .with_parameters(Some(&params(&[("max_bytes", "0")])))
            .is_err());
        assert!(checksum
            .with_parameters(Some(&params(&[("level", "3")])))
            .is_err());
        assert!(checksum
            .with_parameters(Some(&params(&[("enabled", "perhaps")])))
            .is_err());
    }
}
