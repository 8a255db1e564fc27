use lazy_static::lazy_static;
use regex::Regex;
use validator::{ValidationError, ValidationErrors};

use crate::shared::constants::{MAX_SLUG_LENGTH, MAX_TITLE_LENGTH};

lazy_static! {
    /// Regex for public download slugs
    /// Must be lowercase alphanumeric segments joined by single hyphens
    /// - Valid: "annual-report", "report2024", "q1-2024-results"
    /// - Invalid: "-report", "report-", "annual--report", "Report", "annual_report"
    pub static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
}

/// Validation message catalog, keyed by validation code.
///
/// `:field` is replaced with the field name when the message is rendered.
const MESSAGE_CATALOG: &[(&str, &str)] = &[
    ("required", "The :field field is required."),
    ("length", "The :field field has an invalid length."),
    ("slug", "The :field may only contain lowercase letters, digits and single hyphens."),
    ("file", "The :field must be an uploaded file."),
    ("boolean", "The :field field must be true or false."),
];

fn catalog_message(code: &str) -> Option<&'static str> {
    MESSAGE_CATALOG
        .iter()
        .find(|(key, _)| *key == code)
        .map(|(_, message)| *message)
}

/// Flatten validator errors into "field: message" lines, sorted by field.
///
/// An explicit message on the rule wins over the catalog entry for its code.
pub fn validation_messages(errors: &ValidationErrors) -> Vec<String> {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, field_errors)| {
            let field = field.to_string();
            field_errors
                .iter()
                .map(move |error| {
                    let message = match &error.message {
                        Some(message) => message.to_string(),
                        None => catalog_message(&error.code)
                            .unwrap_or(error.code.as_ref())
                            .replace(":field", &field),
                    };
                    format!("{}: {}", field, message)
                })
                .collect::<Vec<_>>()
        })
        .collect();

    messages.sort();
    messages
}

/// Slug rule: empty clears the slug, anything else must match [`SLUG_REGEX`]
pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if slug.len() as u64 > MAX_SLUG_LENGTH {
        return Err(ValidationError::new("length"));
    }
    if slug.is_empty() || SLUG_REGEX.is_match(slug) {
        Ok(())
    } else {
        Err(ValidationError::new("slug"))
    }
}

/// Title rule: not blank once trimmed, at most [`MAX_TITLE_LENGTH`] characters
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::new("required"));
    }
    if title.chars().count() as u64 > MAX_TITLE_LENGTH {
        return Err(ValidationError::new("length"));
    }
    Ok(())
}

/// Turn a possibly blank input into an optional value
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Interpret a form flag such as a checkbox value
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_regex_valid() {
        assert!(SLUG_REGEX.is_match("annual-report"));
        assert!(SLUG_REGEX.is_match("report2024"));
        assert!(SLUG_REGEX.is_match("q1-2024-results"));
        assert!(SLUG_REGEX.is_match("a"));
    }

    #[test]
    fn test_slug_regex_invalid() {
        assert!(!SLUG_REGEX.is_match("-report")); // starts with hyphen
        assert!(!SLUG_REGEX.is_match("report-")); // ends with hyphen
        assert!(!SLUG_REGEX.is_match("annual--report")); // double hyphen
        assert!(!SLUG_REGEX.is_match("Report")); // uppercase
        assert!(!SLUG_REGEX.is_match("annual_report")); // underscore
        assert!(!SLUG_REGEX.is_match("")); // empty
        assert!(!SLUG_REGEX.is_match("annual report")); // space
    }

    #[test]
    fn test_validate_slug_allows_clearing() {
        assert!(validate_slug("").is_ok());
        assert!(validate_slug("my-file").is_ok());
        assert!(validate_slug("My File").is_err());
        assert!(validate_slug(&"a".repeat(MAX_SLUG_LENGTH as usize + 1)).is_err());
    }

    #[test]
    fn test_validate_title_trims_before_checking() {
        assert!(validate_title("Report").is_ok());
        assert_eq!(validate_title("   ").unwrap_err().code, "required");
        assert_eq!(validate_title("").unwrap_err().code, "required");
        assert_eq!(
            validate_title(&"é".repeat(MAX_TITLE_LENGTH as usize + 1))
                .unwrap_err()
                .code,
            "length"
        );
        assert!(validate_title(&format!("  {}  ", "a".repeat(MAX_TITLE_LENGTH as usize))).is_ok());
    }

    #[test]
    fn test_validation_messages_use_catalog() {
        let mut errors = ValidationErrors::new();
        errors.add("title", ValidationError::new("required"));
        errors.add("slug", ValidationError::new("slug"));

        let messages = validation_messages(&errors);
        assert_eq!(
            messages,
            vec![
                "slug: The slug may only contain lowercase letters, digits and single hyphens."
                    .to_string(),
                "title: The title field is required.".to_string(),
            ]
        );
    }

    #[test]
    fn test_validation_messages_prefer_explicit_message() {
        let mut errors = ValidationErrors::new();
        errors.add(
            "file",
            ValidationError::new("file").with_message("Upload is empty".into()),
        );

        assert_eq!(validation_messages(&errors), vec!["file: Upload is empty"]);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("on"), Some(true));
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  ".to_string())), None);
        assert_eq!(non_empty(Some(" x ".to_string())), Some("x".to_string()));
        assert_eq!(non_empty(None), None);
    }
}
