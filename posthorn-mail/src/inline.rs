//! CSS inlining.
//!
//! Most mail clients drop `<style>` blocks, so rendered views are rewritten
//! with their rules moved into `style` attributes before sending. The base
//! URL lets linked stylesheets resolve relative to the template file.

use async_trait::async_trait;
use url::Url;

use crate::{MailError, Result};

/// Moves CSS rules into inline `style` attributes.
#[async_trait]
pub trait Inline: Send + Sync {
    /// Inline the styles of `html`, resolving relative assets against `base_url`.
    async fn inline(&self, html: &str, base_url: &Url) -> Result<String>;
}

/// [`Inline`] implementation backed by the `css-inline` crate.
#[derive(Debug, Clone)]
pub struct CssInliner {
    load_remote_stylesheets: bool,
    keep_style_tags: bool,
}

impl CssInliner {
    /// Create an inliner that follows `<link rel="stylesheet">` references
    /// and strips `<style>` blocks once their rules are inlined.
    pub fn new() -> Self {
        Self {
            load_remote_stylesheets: true,
            keep_style_tags: false,
        }
    }

    /// Whether `<link>`ed stylesheets are loaded.
    pub fn load_remote_stylesheets(mut self, load: bool) -> Self {
        self.load_remote_stylesheets = load;
        self
    }

    /// Whether `<style>` blocks survive inlining.
    pub fn keep_style_tags(mut self, keep: bool) -> Self {
        self.keep_style_tags = keep;
        self
    }

    /// Inline on the current thread.
    pub fn inline_blocking(&self, html: &str, base_url: &Url) -> Result<String> {
        let base = css_inline::Url::parse(base_url.as_str())
            .map_err(|e| MailError::Inline(format!("invalid base URL {}: {}", base_url, e)))?;

        let inliner = css_inline::CSSInliner::options()
            .base_url(Some(base))
            .load_remote_stylesheets(self.load_remote_stylesheets)
            .keep_style_tags(self.keep_style_tags)
            .build();

        Ok(inliner.inline(html)?)
    }
}

impl Default for CssInliner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Inline for CssInliner {
    async fn inline(&self, html: &str, base_url: &Url) -> Result<String> {
        // Loading linked stylesheets reads from disk.
        let inliner = self.clone();
        let html = html.to_string();
        let base_url = base_url.clone();

        tokio::task::spawn_blocking(move || inliner.inline_blocking(&html, &base_url))
            .await
            .map_err(|e| MailError::Inline(e.to_string()))?
    }
}
