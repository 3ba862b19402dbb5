//! # Posthorn
//!
//! Render view templates into CSS-inlined HTML email and send them through a
//! reloadable mail transport.
//!
//! This crate bundles [`posthorn_mail`] (the send pipeline, transports and
//! middleware installer), [`posthorn_config`] (file and environment
//! configuration, behind the `config` feature) and a [`logging`] setup.
//!
//! ```rust,ignore
//! use posthorn::prelude::*;
//!
//! LogConfig::default().init().ok();
//!
//! let extension = install(MailSettings::from_env()?)?;
//! extension.handle(&req, &mut res, || next());
//! ```

pub mod logging;

pub use posthorn_mail::*;

#[cfg(feature = "config")]
pub use posthorn_config;

#[cfg(feature = "config")]
pub use posthorn_config::{ConfigError, MailSettings};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::logging::{LogConfig, LogFormat, LogLevel, LogOutput};
    pub use posthorn_mail::prelude::*;

    #[cfg(feature = "config")]
    pub use posthorn_config::{ConfigError, MailSettings};
}
