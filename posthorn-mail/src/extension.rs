//! Installing the `mail` capability on host objects.
//!
//! The extension runs as request middleware. On every request it reads the
//! view engine extension and views root from the application settings and
//! attaches a fresh [`Mail`] capability to the application and to the
//! response. Both capabilities share one [`TransportHolder`], so a reload
//! through either is seen by both.
//!
//! # Example
//!
//! ```rust,ignore
//! use posthorn_mail::{install, MailConfig, MailOptions};
//! use serde_json::json;
//!
//! let extension = install(
//!     MailConfig::new("SMTP").with_config(json!({"host": "smtp.example.com"})),
//! )?;
//!
//! // In the host's middleware chain:
//! extension.handle(&req, &mut res, || next(req))?;
//!
//! // In a handler:
//! res.mail().send(
//!     "welcome",
//!     MailOptions::new().to("user@example.com").locals(json!({"name": "Ada"})),
//! ).await?;
//! ```

use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::trace;

use crate::pipeline::normalize_extension;
use crate::{
    CssInliner, DefaultTransportFactory, Inline, MailConfig, MailOptions, Render, Result,
    SendPipeline, SentMail, TransportFactory, TransportHolder,
};

/// Application setting naming the view engine (and so the view extension).
pub const VIEW_ENGINE_SETTING: &str = "view engine";

/// Application setting holding the views root directory.
pub const VIEWS_SETTING: &str = "views";

/// Views root used when the application does not set one.
pub const DEFAULT_VIEWS_ROOT: &str = "views";

/// The host application.
pub trait Application: Send + Sync {
    /// Look up a setting such as [`VIEW_ENGINE_SETTING`] or [`VIEWS_SETTING`].
    fn get(&self, setting: &str) -> Option<String>;

    /// Renderer bound to the application scope.
    fn renderer(&self) -> Arc<dyn Render>;

    /// Store the installed capability.
    fn attach_mail(&self, mail: Mail);
}

/// The per-request response object.
pub trait ResponseContext {
    /// Renderer bound to this response.
    fn renderer(&self) -> Arc<dyn Render>;

    /// Store the installed capability.
    fn attach_mail(&mut self, mail: Mail);
}

/// The incoming request, through which the application is reached.
pub trait RequestContext {
    /// Application type.
    type App: Application + ?Sized;

    /// The application serving this request.
    fn app(&self) -> &Self::App;
}

/// Interior-mutable holder hosts can use to keep an installed [`Mail`].
#[derive(Default)]
pub struct MailSlot(RwLock<Option<Mail>>);

impl MailSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored capability.
    pub fn set(&self, mail: Mail) {
        *self.0.write() = Some(mail);
    }

    /// The stored capability, if installed.
    pub fn get(&self) -> Option<Mail> {
        self.0.read().clone()
    }

    /// Whether a capability has been installed.
    pub fn is_installed(&self) -> bool {
        self.0.read().is_some()
    }
}

/// The `mail` capability: `send`, `stub` and `reload`.
#[derive(Clone)]
pub struct Mail {
    send: SendPipeline,
    stub: SendPipeline,
    holder: TransportHolder,
}

impl Mail {
    /// Bind a capability to one renderer.
    pub fn new(
        holder: TransportHolder,
        render: Arc<dyn Render>,
        inliner: Arc<dyn Inline>,
        root: impl Into<PathBuf>,
        ext: impl Into<String>,
    ) -> Self {
        let root = root.into();
        let ext = ext.into();
        Self {
            send: SendPipeline::live(
                holder.clone(),
                render.clone(),
                inliner.clone(),
                root.clone(),
                ext.clone(),
            ),
            stub: SendPipeline::stub(holder.clone(), render, inliner, root, ext),
            holder,
        }
    }

    /// Render `template` and send it through the real transport.
    pub async fn send(&self, template: &str, options: MailOptions) -> Result<SentMail> {
        self.send.send(template, options).await
    }

    /// Render `template` and hand it to the stub transport.
    pub async fn stub(&self, template: &str, options: MailOptions) -> Result<SentMail> {
        self.stub.send(template, options).await
    }

    /// Close the real transport and replace it and the defaults.
    ///
    /// A close failure is returned and nothing changes. Callers that do not
    /// care may drop the result; nothing else reports it.
    pub async fn reload(&self, config: &MailConfig) -> Result<()> {
        self.holder.reload(config).await
    }

    /// The defaults currently merged into every send.
    pub fn defaults(&self) -> MailOptions {
        self.holder.defaults()
    }

    /// The shared transport state.
    pub fn holder(&self) -> &TransportHolder {
        &self.holder
    }
}

/// The installed extension: shared transport state plus the inliner.
#[derive(Clone)]
pub struct MailExtension {
    holder: TransportHolder,
    inliner: Arc<dyn Inline>,
}

/// Install the extension with the built-in transports and CSS inliner.
///
/// Builds the stub transport and then the real transport described by
/// `config`.
pub fn install(config: MailConfig) -> Result<MailExtension> {
    MailExtension::with_factory(config, Arc::new(DefaultTransportFactory))
}

impl MailExtension {
    /// Install with a custom transport factory.
    pub fn with_factory(config: MailConfig, factory: Arc<dyn TransportFactory>) -> Result<Self> {
        Ok(Self {
            holder: TransportHolder::new(&config, factory)?,
            inliner: Arc::new(CssInliner::new()),
        })
    }

    /// Replace the CSS inliner.
    pub fn with_inliner(mut self, inliner: Arc<dyn Inline>) -> Self {
        self.inliner = inliner;
        self
    }

    /// The shared transport state.
    pub fn holder(&self) -> &TransportHolder {
        &self.holder
    }

    /// Attach fresh capabilities to the application and the response, then
    /// call `next`.
    ///
    /// `next` is always called and its result returned as is.
    pub fn handle<Req, Res, N, R>(&self, req: &Req, res: &mut Res, next: N) -> R
    where
        Req: RequestContext + ?Sized,
        Res: ResponseContext + ?Sized,
        N: FnOnce() -> R,
    {
        let app = req.app();
        let ext = normalize_extension(&app.get(VIEW_ENGINE_SETTING).unwrap_or_default());
        let root = app
            .get(VIEWS_SETTING)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_VIEWS_ROOT));

        trace!(ext = %ext, root = %root.display(), "Attaching mail capability");

        app.attach_mail(self.bind(app.renderer(), root.clone(), ext.clone()));
        res.attach_mail(self.bind(res.renderer(), root, ext));

        next()
    }

    /// Build a capability bound to `render`.
    pub fn bind(&self, render: Arc<dyn Render>, root: impl Into<PathBuf>, ext: impl Into<String>) -> Mail {
        Mail::new(self.holder.clone(), render, self.inliner.clone(), root, ext)
    }
}
