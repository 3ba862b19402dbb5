//! # Posthorn Mail
//!
//! Render a view template, inline its CSS and send it through a reloadable
//! mail transport.
//!
//! ## Features
//!
//! - **Send pipeline**: render → inline CSS against the template's `file://`
//!   URL → submit to the transport
//! - **Stub transport**: records messages instead of delivering them
//! - **Reload**: close the live transport and swap in a new one at runtime
//! - **Middleware installer**: attaches `send`, `stub` and `reload` to the
//!   application and to each response
//! - **Transports**: SMTP and sendmail via lettre
//! - **Views**: optional handlebars view engine
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use posthorn_mail::{install, MailConfig, MailOptions};
//! use serde_json::json;
//!
//! let extension = install(
//!     MailConfig::new("SMTP")
//!         .with_config(json!({"host": "smtp.example.com", "port": 587}))
//!         .with_defaults(MailOptions::new().from("noreply@example.com")),
//! )?;
//!
//! // Once per request:
//! extension.handle(&req, &mut res, || next());
//!
//! // Later, from a handler:
//! let mail = res.mail();
//! mail.send("welcome", MailOptions::new().to("ada@example.com")).await?;
//! mail.stub("welcome", MailOptions::new().to("ada@example.com")).await?;
//! mail.reload(&MailConfig::new("sendmail")).await?;
//! ```

mod address;
mod config;
mod error;
mod extension;
mod holder;
mod inline;
mod message;
mod options;
mod pipeline;
mod render;
mod stub;
mod transport;

#[cfg(feature = "handlebars")]
mod views;

pub use address::Address;
pub use config::MailConfig;
pub use error::{MailError, Result};
pub use extension::{
    Application, DEFAULT_VIEWS_ROOT, Mail, MailExtension, MailSlot, RequestContext,
    ResponseContext, VIEW_ENGINE_SETTING, VIEWS_SETTING, install,
};
pub use holder::TransportHolder;
pub use inline::{CssInliner, Inline};
pub use message::{ComposedMessage, Envelope, SentMail, compose, html_to_text};
pub use options::{GENERATE_TEXT_FROM_HTML, HTML, LOCALS, MailOptions, merge};
pub use pipeline::{SendPipeline, normalize_extension, qualify_template, template_url, view_file};
pub use render::{Render, RenderFn, render_fn};
pub use stub::StubTransport;
pub use transport::{
    DefaultTransportFactory, SendmailTransport, SmtpConfig, SmtpSecurity, SmtpTransport,
    Transport, TransportConfig, TransportFactory, TransportKind,
};

#[cfg(feature = "handlebars")]
pub use views::{ViewConfig, ViewEngine};

pub use url::Url;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports.
///
/// ```
/// use posthorn_mail::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{MailError, Result};
    pub use crate::extension::{
        Application, Mail, MailExtension, MailSlot, RequestContext, ResponseContext, install,
    };
    pub use crate::inline::{CssInliner, Inline};
    pub use crate::message::SentMail;
    pub use crate::options::MailOptions;
    pub use crate::render::{Render, render_fn};
    pub use crate::stub::StubTransport;
    pub use crate::transport::{Transport, TransportConfig, TransportFactory, TransportKind};
    pub use crate::{MailConfig, TransportHolder};

    #[cfg(feature = "handlebars")]
    pub use crate::views::{ViewConfig, ViewEngine};
}
