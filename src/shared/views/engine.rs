use minijinja::Environment;
use serde::Serialize;
use thiserror::Error;

/// Templates compiled into the binary, keyed by their name under `templates/views/`
const TEMPLATES: &[(&str, &str)] = &[
    (
        "layout.html",
        include_str!("../../../templates/views/layout.html"),
    ),
    (
        "alert.html",
        include_str!("../../../templates/views/alert.html"),
    ),
    (
        "files/index.html",
        include_str!("../../../templates/views/files/index.html"),
    ),
    (
        "files/create.html",
        include_str!("../../../templates/views/files/create.html"),
    ),
    (
        "files/show.html",
        include_str!("../../../templates/views/files/show.html"),
    ),
    (
        "files/edit.html",
        include_str!("../../../templates/views/files/edit.html"),
    ),
    (
        "files/upload_error.html",
        include_str!("../../../templates/views/files/upload_error.html"),
    ),
];

/// Errors that can occur during template operations
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template '{0}' not found")]
    NotFound(String),

    #[error("Failed to load template '{name}': {reason}")]
    LoadError { name: String, reason: String },

    #[error("Failed to render template: {0}")]
    RenderError(String),
}

/// Renders the admin views
pub struct ViewRenderer {
    env: Environment<'static>,
}

impl ViewRenderer {
    /// Compile all embedded templates; a syntax error fails startup
    pub fn new() -> Result<Self, TemplateError> {
        let mut env = Environment::new();
        env.add_filter("filesize", filesize);

        for (name, source) in TEMPLATES {
            env.add_template(name, source)
                .map_err(|e| TemplateError::LoadError {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
            tracing::debug!("Loaded view: {}", name);
        }

        Ok(Self { env })
    }

    /// Render a view with a serializable context
    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String, TemplateError> {
        let template = self
            .env
            .get_template(name)
            .map_err(|_| TemplateError::NotFound(name.to_string()))?;

        template
            .render(ctx)
            .map_err(|e| TemplateError::RenderError(e.to_string()))
    }
}

/// Human-readable byte count: 512 B, 1.5 KB, 3.2 MB
fn filesize(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}
