use chrono::{DateTime, Utc};
use std::path::Path;
use uuid::Uuid;

use super::{NameGenerator, NameSeed, NamingError};
use crate::modules::storage::is_contained;

/// How many suffixed variants are tried before giving up
pub const MAX_ATTEMPTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Uuid,
    Random,
    Timestamp,
    Year,
    Month,
    Day,
    Filename,
    Extension,
    MimeType,
}

impl Token {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "uuid" => Some(Token::Uuid),
            "random" => Some(Token::Random),
            "timestamp" => Some(Token::Timestamp),
            "year" => Some(Token::Year),
            "month" => Some(Token::Month),
            "day" => Some(Token::Day),
            "filename" => Some(Token::Filename),
            "extension" => Some(Token::Extension),
            "mime_type" => Some(Token::MimeType),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(Token),
}

/// Name generator driven by a pattern such as `{year}/{month}/{uuid}.{extension}`.
///
/// Supported tokens: `uuid`, `random` (12 hex chars), `timestamp` (unix
/// seconds), `year`, `month`, `day`, `filename` (sanitised original stem),
/// `extension` and `mime_type` (the part before the slash).
#[derive(Debug, Clone)]
pub struct PatternNameGenerator {
    pattern: String,
    segments: Vec<Segment>,
}

impl PatternNameGenerator {
    pub fn new(pattern: &str) -> Result<Self, NamingError> {
        let invalid = |reason: &str| NamingError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.trim().is_empty() {
            return Err(invalid("pattern is empty"));
        }
        if pattern.starts_with('/') {
            return Err(invalid("pattern must be relative"));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = pattern;

        while let Some(open) = rest.find(['{', '}']) {
            if rest[open..].starts_with('}') {
                return Err(invalid("unbalanced '}'"));
            }
            literal.push_str(&rest[..open]);

            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
            let name = &after[..close];
            let token = Token::parse(name)
                .ok_or_else(|| invalid(&format!("unknown token '{{{}}}'", name)))?;

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Token(token));
            rest = &after[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if !segments.iter().any(|s| matches!(s, Segment::Token(_))) {
            return Err(invalid("pattern needs at least one token"));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn render(&self, seed: &NameSeed, now: DateTime<Utc>) -> String {
        let mut name = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => name.push_str(text),
                Segment::Token(token) => name.push_str(&render_token(*token, seed, now)),
            }
        }
        name.trim_end_matches('.').to_string()
    }
}

fn render_token(token: Token, seed: &NameSeed, now: DateTime<Utc>) -> String {
    match token {
        Token::Uuid => Uuid::new_v4().to_string(),
        Token::Random => hex::encode(&Uuid::new_v4().as_bytes()[..6]),
        Token::Timestamp => now.timestamp().to_string(),
        Token::Year => now.format("%Y").to_string(),
        Token::Month => now.format("%m").to_string(),
        Token::Day => now.format("%d").to_string(),
        Token::Filename => sanitize_stem(&seed.filename),
        Token::Extension => seed.extension.to_lowercase(),
        Token::MimeType => seed
            .mime
            .split('/')
            .next()
            .map(sanitize_stem)
            .unwrap_or_default(),
    }
}

/// Lowercase ASCII stem of a client filename, safe for use in a path
fn sanitize_stem(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);

    let mut sanitized = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            sanitized.push(c.to_ascii_lowercase());
        } else if !sanitized.ends_with('-') {
            sanitized.push('-');
        }
    }

    let sanitized = sanitized.trim_matches('-');
    if sanitized.is_empty() {
        "file".to_string()
    } else {
        sanitized.to_string()
    }
}

/// `dir/name.ext` -> `dir/name-3.ext`
pub fn with_suffix(name: &str, attempt: usize) -> String {
    let (dir, file) = match name.rfind('/') {
        Some(idx) => (&name[..=idx], &name[idx + 1..]),
        None => ("", name),
    };
    match file.rfind('.') {
        Some(dot) if dot > 0 => format!("{}{}-{}{}", dir, &file[..dot], attempt, &file[dot..]),
        _ => format!("{}{}-{}", dir, file, attempt),
    }
}

impl NameGenerator for PatternNameGenerator {
    fn generate_name(&self, seed: &NameSeed, directory: &Path) -> Result<String, NamingError> {
        let base = self.render(seed, Utc::now());
        if !is_contained(Path::new(&base)) {
            return Err(NamingError::InvalidName(base));
        }

        for attempt in 0..MAX_ATTEMPTS {
            let candidate = if attempt == 0 {
                base.clone()
            } else {
                with_suffix(&base, attempt)
            };

            if !directory.join(&candidate).exists() {
                return Ok(candidate);
            }
            tracing::debug!("Generated name '{}' is taken, retrying", candidate);
        }

        Err(NamingError::Exhausted(base, MAX_ATTEMPTS))
    }
}
