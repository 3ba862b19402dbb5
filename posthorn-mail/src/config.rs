//! Installer configuration.

use serde::{Deserialize, Serialize};

use crate::{MailOptions, TransportConfig, TransportKind};

/// Configuration for installing (or reloading) the mail extension.
///
/// ```rust
/// use posthorn_mail::{MailConfig, MailOptions};
/// use serde_json::json;
///
/// let config = MailConfig::new("SMTP")
///     .with_config(json!({"host": "smtp.example.com", "port": 587}))
///     .with_defaults(MailOptions::new().from("noreply@example.com"));
/// assert_eq!(config.transport.as_str(), "SMTP");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MailConfig {
    /// Transport kind identifier. SMTP when omitted.
    #[serde(default)]
    pub transport: TransportKind,
    /// Transport configuration handed to the transport factory.
    #[serde(default)]
    pub config: TransportConfig,
    /// Default mail options.
    #[serde(default)]
    pub defaults: Option<MailOptions>,
}

impl MailConfig {
    /// Configuration for the given transport kind.
    pub fn new(transport: impl Into<TransportKind>) -> Self {
        Self {
            transport: transport.into(),
            config: TransportConfig::none(),
            defaults: None,
        }
    }

    /// Set the transport configuration.
    pub fn with_config(mut self, config: impl Into<TransportConfig>) -> Self {
        self.config = config.into();
        self
    }

    /// Set the default mail options.
    pub fn with_defaults(mut self, defaults: MailOptions) -> Self {
        self.defaults = Some(defaults);
        self
    }
}
