//! HTML views for the admin pages, rendered with minijinja.

mod engine;

pub use engine::{TemplateError, ViewRenderer};
