//! The template rendering seam.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::Result;

/// Renders a named view template to HTML.
///
/// Hosts bind one renderer per object that receives the `mail` capability,
/// so a template rendered through the response sees response-scoped
/// variables while one rendered through the application does not.
#[async_trait]
pub trait Render: Send + Sync {
    /// Render `template` with the given template variables.
    async fn render(&self, template: &str, locals: &Value) -> Result<String>;
}

#[async_trait]
impl<T: Render + ?Sized> Render for Arc<T> {
    async fn render(&self, template: &str, locals: &Value) -> Result<String> {
        (**self).render(template, locals).await
    }
}

/// Adapts a closure into a [`Render`] implementation.
///
/// ```rust,ignore
/// let render = render_fn(|name, locals| Ok(format!("<h1>{name}</h1>")));
/// ```
pub fn render_fn<F>(f: F) -> RenderFn<F>
where
    F: Fn(&str, &Value) -> Result<String> + Send + Sync,
{
    RenderFn(f)
}

/// Closure-backed renderer returned by [`render_fn`].
pub struct RenderFn<F>(F);

#[async_trait]
impl<F> Render for RenderFn<F>
where
    F: Fn(&str, &Value) -> Result<String> + Send + Sync,
{
    async fn render(&self, template: &str, locals: &Value) -> Result<String> {
        (self.0)(template, locals)
    }
}
