//! Handlebars view engine.
//!
//! A ready-made [`Render`] for hosts that keep their views as handlebars
//! files under a single directory. Template names are paths relative to the
//! views root; the configured extension is appended when the name has none.

use async_trait::async_trait;
use handlebars::Handlebars;
use parking_lot::RwLock;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::{MailError, Render, Result};

/// Configuration for [`ViewEngine`].
#[derive(Debug, Clone)]
pub struct ViewConfig {
    /// Directory containing view files.
    pub root: PathBuf,
    /// View file extension, dot-prefixed.
    pub extension: String,
    /// Re-read view files on every render.
    pub dev_mode: bool,
    /// Error on missing variables.
    pub strict_mode: bool,
}

impl ViewConfig {
    /// Views under `root` with the `.hbs` extension.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: ".hbs".to_string(),
            dev_mode: false,
            strict_mode: false,
        }
    }

    /// Set the view extension; a leading dot is added when missing.
    pub fn with_extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = crate::pipeline::normalize_extension(&ext.into());
        self
    }

    /// Enable development mode (no view caching).
    pub fn with_dev_mode(mut self, enable: bool) -> Self {
        self.dev_mode = enable;
        self
    }

    /// Enable strict mode.
    pub fn with_strict_mode(mut self, enable: bool) -> Self {
        self.strict_mode = enable;
        self
    }
}

/// Handlebars-backed view renderer.
#[derive(Clone)]
pub struct ViewEngine {
    handlebars: Arc<RwLock<Handlebars<'static>>>,
    config: ViewConfig,
}

impl ViewEngine {
    /// Create a view engine. Views are loaded lazily on first render.
    pub fn new(config: ViewConfig) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(config.strict_mode);
        Self {
            handlebars: Arc::new(RwLock::new(handlebars)),
            config,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Register a view from a string instead of a file.
    pub fn register_template(&self, name: &str, content: &str) -> Result<()> {
        self.handlebars
            .write()
            .register_template_string(name, content)?;
        Ok(())
    }

    /// Register a partial.
    pub fn register_partial(&self, name: &str, content: &str) -> Result<()> {
        self.handlebars.write().register_partial(name, content)?;
        Ok(())
    }

    /// Path of the file backing a view name.
    pub fn view_path(&self, template: &str) -> PathBuf {
        let file = if template.contains('.') {
            template.to_string()
        } else {
            format!("{}{}", template, self.config.extension)
        };
        crate::pipeline::view_file(&self.config.root, &file)
    }

    async fn load(&self, template: &str) -> Result<()> {
        let cached = self.handlebars.read().has_template(template);
        if cached && !self.config.dev_mode {
            return Ok(());
        }

        let path = self.view_path(template);
        let content = read_view(&path).await?;
        self.handlebars
            .write()
            .register_template_string(template, content)?;

        debug!(template, path = %path.display(), "Loaded view");
        Ok(())
    }
}

async fn read_view(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(MailError::TemplateNotFound(path.display().to_string()))
        }
        Err(e) => Err(MailError::Io(e)),
    }
}

#[async_trait]
impl Render for ViewEngine {
    async fn render(&self, template: &str, locals: &Value) -> Result<String> {
        self.load(template).await?;
        let html = self.handlebars.read().render(template, locals)?;
        Ok(html)
    }
}
