use minijinja::{Environment, UndefinedBehavior};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The data mapping handed to a deck template.
pub type TemplateData = BTreeMap<String, Value>;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read template '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Template parse error: {0}")]
    Parse(String),
    #[error("Template render error: {0}")]
    Render(String),
    #[error("Failed to serialize template data: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Renders template text against a data mapping.
///
/// Implementations must fail when the template references a key that is absent
/// from the mapping instead of emitting blanks.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, data: &TemplateData) -> Result<String, TemplateError>;
}

/// Jinja rendering with strict undefined handling.
#[derive(Debug, Default, Clone, Copy)]
pub struct JinjaRenderer;

impl JinjaRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateRenderer for JinjaRenderer {
    fn render(&self, template: &str, data: &TemplateData) -> Result<String, TemplateError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);

        env.add_template("deck", template)
            .map_err(|e| TemplateError::Parse(e.to_string()))?;
        let tmpl = env
            .get_template("deck")
            .map_err(|e| TemplateError::Parse(e.to_string()))?;
        tmpl.render(minijinja::Value::from_serialize(data))
            .map_err(|e| TemplateError::Render(e.to_string()))
    }
}

/// Amends the template data right before rendering.
///
/// Design-specific decks use this to add keys the generic writer knows nothing about.
pub trait TemplateDataHook: Send + Sync {
    fn amend(&self, data: &mut TemplateData);
}

/// Leaves the template data untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHook;

impl TemplateDataHook for NoHook {
    fn amend(&self, _data: &mut TemplateData) {}
}

impl<F> TemplateDataHook for F
where
    F: Fn(&mut TemplateData) + Send + Sync,
{
    fn amend(&self, data: &mut TemplateData) {
        self(data)
    }
}

/// The bundled homogenized 0-D deck.
pub const DEFAULT_TEMPLATE: &str = include_str!("../../../templates/dragon_0d.x2m.jinja");

/// Template text from a file, or the bundled default when no path is given.
pub fn load_template(path: Option<&Path>) -> Result<String, TemplateError> {
    match path {
        Some(path) => std::fs::read_to_string(path).map_err(|e| TemplateError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
        None => Ok(DEFAULT_TEMPLATE.to_string()),
    }
}
