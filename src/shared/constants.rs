/// Default page size for pagination
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Maximum page size allowed
pub const MAX_PAGE_SIZE: i64 = 100;

/// Maximum length of a file title
pub const MAX_TITLE_LENGTH: u64 = 255;

/// Maximum length of a file description
pub const MAX_DESCRIPTION_LENGTH: u64 = 5000;

/// Maximum length of a public slug
pub const MAX_SLUG_LENGTH: u64 = 120;

/// Handling script used when the configuration does not name one
pub const DEFAULT_HANDLING_SCRIPT: &str = "user-device";
