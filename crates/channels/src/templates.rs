//! Email body templates with literal `{key}` substitution.
//!
//! Unresolved placeholders stay in the output as written. No HTML escaping is
//! applied; template authors own their markup.

use std::collections::HashMap;
use std::path::PathBuf;

use dashmap::DashMap;
use drip_core::DripError;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template '{0}' not found")]
    NotFound(String),
    #[error("template '{name}' unreadable: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<TemplateError> for DripError {
    fn from(err: TemplateError) -> Self {
        DripError::Template(err.to_string())
    }
}

/// Turns a named template plus a flat substitution map into a body.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, vars: &HashMap<String, String>)
        -> Result<String, TemplateError>;
}

/// Replace every `{key}` with its value.
pub fn substitute(text: &str, vars: &HashMap<String, String>) -> String {
    let mut out = text.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Reads `<dir>/<template>.html` on every render.
pub struct FileTemplateRenderer {
    dir: PathBuf,
}

impl FileTemplateRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, template: &str) -> Option<PathBuf> {
        // Template names are identifiers, never paths.
        if template.is_empty()
            || !template
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return None;
        }
        Some(self.dir.join(format!("{template}.html")))
    }
}

impl TemplateRenderer for FileTemplateRenderer {
    fn render(
        &self,
        template: &str,
        vars: &HashMap<String, String>,
    ) -> Result<String, TemplateError> {
        let path = self
            .path_for(template)
            .ok_or_else(|| TemplateError::NotFound(template.to_string()))?;
        if !path.exists() {
            return Err(TemplateError::NotFound(template.to_string()));
        }
        let raw = std::fs::read_to_string(&path).map_err(|source| TemplateError::Io {
            name: template.to_string(),
            source,
        })?;
        debug!(template, path = %path.display(), "Rendering file template");
        Ok(substitute(&raw, vars))
    }
}

/// Templates registered in memory.
#[derive(Default)]
pub struct InMemoryTemplates {
    templates: DashMap<String, String>,
}

impl InMemoryTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(self, name: &str, body: &str) -> Self {
        self.insert(name, body);
        self
    }

    pub fn insert(&self, name: &str, body: &str) {
        self.templates.insert(name.to_string(), body.to_string());
    }
}

impl TemplateRenderer for InMemoryTemplates {
    fn render(
        &self,
        template: &str,
        vars: &HashMap<String, String>,
    ) -> Result<String, TemplateError> {
        let raw = self
            .templates
            .get(template)
            .ok_or_else(|| TemplateError::NotFound(template.to_string()))?;
        Ok(substitute(&raw, vars))
    }
}
