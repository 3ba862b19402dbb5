//! The render → inline → send pipeline.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;

use crate::{Inline, MailError, MailOptions, Render, Result, SentMail, Transport, TransportHolder};

/// Which transport a pipeline submits to.
#[derive(Clone)]
enum Target {
    /// The holder's current real transport, looked up at submission time.
    Live(TransportHolder),
    /// The holder's stub transport.
    Stub(TransportHolder),
}

impl Target {
    fn holder(&self) -> &TransportHolder {
        match self {
            Target::Live(holder) | Target::Stub(holder) => holder,
        }
    }

    fn transport(&self) -> Arc<dyn Transport> {
        match self {
            Target::Live(holder) => holder.transport(),
            Target::Stub(holder) => holder.stub(),
        }
    }
}

/// A send function bound to one transport and one renderer.
#[derive(Clone)]
pub struct SendPipeline {
    target: Target,
    render: Arc<dyn Render>,
    inliner: Arc<dyn Inline>,
    root: PathBuf,
    ext: String,
}

impl SendPipeline {
    /// Pipeline submitting to the holder's real transport.
    pub fn live(
        holder: TransportHolder,
        render: Arc<dyn Render>,
        inliner: Arc<dyn Inline>,
        root: impl Into<PathBuf>,
        ext: impl Into<String>,
    ) -> Self {
        Self::with_target(Target::Live(holder), render, inliner, root.into(), ext.into())
    }

    /// Pipeline submitting to the holder's stub transport.
    pub fn stub(
        holder: TransportHolder,
        render: Arc<dyn Render>,
        inliner: Arc<dyn Inline>,
        root: impl Into<PathBuf>,
        ext: impl Into<String>,
    ) -> Self {
        Self::with_target(Target::Stub(holder), render, inliner, root.into(), ext.into())
    }

    fn with_target(
        target: Target,
        render: Arc<dyn Render>,
        inliner: Arc<dyn Inline>,
        root: PathBuf,
        ext: String,
    ) -> Self {
        Self {
            target,
            render,
            inliner,
            root,
            ext: normalize_extension(&ext),
        }
    }

    /// Render `template`, inline its CSS and submit the message.
    ///
    /// The current defaults are merged *onto* `options`: for a key present
    /// in both, the default wins. Rendering uses `options.locals`. The first
    /// failing stage ends the pipeline and its error is returned unchanged.
    pub async fn send(&self, template: &str, mut options: MailOptions) -> Result<SentMail> {
        let defaults = self.target.holder().defaults();
        options.merge(Some(&defaults));

        trace!(template, "Rendering mail template");
        let html = self.render.render(template, options.locals_value()).await?;

        let url = template_url(&self.root, &qualify_template(template, &self.ext))?;
        trace!(url = %url, "Inlining CSS");
        let html = self.inliner.inline(&html, &url).await?;

        options.set_html(html);

        let transport = self.target.transport();
        debug!(template, "Submitting mail to transport");
        transport.send_mail(&options).await
    }
}

/// Prefix `ext` with a dot unless it already starts with one. An empty
/// extension stays empty.
pub fn normalize_extension(ext: &str) -> String {
    if ext.is_empty() || ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}

/// Append `ext` to a template name that contains no `.` anywhere.
///
/// Only the presence of a dot is checked, so `a.b/c` is left alone.
pub fn qualify_template(template: &str, ext: &str) -> String {
    if template.contains('.') {
        template.to_string()
    } else {
        format!("{}{}", template, ext)
    }
}

/// Path of `template` nested under `root`.
///
/// Leading `/` does not replace the root, and `..` never climbs above it.
pub fn view_file(root: &Path, template: &str) -> PathBuf {
    let mut parts: Vec<&OsStr> = Vec::new();
    for component in Path::new(template).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                parts.pop();
            }
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
        }
    }

    let mut path = root.to_path_buf();
    path.extend(parts);
    path
}

/// `file://` URL of a template under the views root.
///
/// A relative root is resolved against the current working directory.
pub fn template_url(root: &Path, template: &str) -> Result<Url> {
    let path = view_file(root, template);
    let path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()?.join(path)
    };

    Url::from_file_path(&path)
        .map_err(|()| MailError::Inline(format!("cannot build file URL for {}", path.display())))
}
