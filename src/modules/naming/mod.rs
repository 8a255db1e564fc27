//! Filename generation for stored uploads
//!
//! Produces storage names from a configurable pattern and makes sure the
//! name is free in the target directory at the time it is generated.

mod pattern;

pub use pattern::{with_suffix, PatternNameGenerator, MAX_ATTEMPTS};

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NamingError {
    #[error("Invalid filename pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Generated name '{0}' is not a relative path")]
    InvalidName(String),

    #[error("No free name for '{0}' after {1} attempts")]
    Exhausted(String, usize),
}

/// Metadata a name can be derived from
#[derive(Debug, Clone, Default)]
pub struct NameSeed {
    pub mime: String,
    pub extension: String,
    pub filename: String,
}

/// Generates a storage-relative filename that is unused inside `directory`
pub trait NameGenerator: Send + Sync {
    fn generate_name(&self, seed: &NameSeed, directory: &Path) -> Result<String, NamingError>;
}
