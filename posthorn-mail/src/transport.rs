//! Email transport implementations.

use async_trait::async_trait;
use lettre::{
    AsyncSendmailTransport, AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    transport::smtp::authentication::Credentials,
};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::message::{SentMail, compose};
use crate::{MailError, MailOptions, Result, StubTransport};

/// Email transport trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit a message described by `options`.
    async fn send_mail(&self, options: &MailOptions) -> Result<SentMail>;

    /// Release the transport's resources. Sends after a close fail.
    async fn close(&self) -> Result<()>;
}

/// Identifier of a transport backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// SMTP relay.
    #[default]
    Smtp,
    /// Local sendmail binary.
    Sendmail,
    /// Non-delivering stub.
    Stub,
    /// Any other identifier, left to custom factories.
    Other(String),
}

impl TransportKind {
    /// Parse an identifier, case-insensitively.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "SMTP" => Self::Smtp,
            "SENDMAIL" => Self::Sendmail,
            "STUB" => Self::Stub,
            _ => Self::Other(s.trim().to_string()),
        }
    }

    /// The identifier as written in configuration.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Smtp => "SMTP",
            Self::Sendmail => "SENDMAIL",
            Self::Stub => "STUB",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for TransportKind {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl Serialize for TransportKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TransportKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// Transport configuration, passed verbatim to the [`TransportFactory`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportConfig(pub Value);

impl TransportConfig {
    /// Empty configuration.
    pub fn none() -> Self {
        Self(Value::Null)
    }

    /// Look up a top-level key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up a top-level string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// The raw value.
    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for TransportConfig {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<&str> for TransportConfig {
    fn from(value: &str) -> Self {
        Self(Value::String(value.to_string()))
    }
}

/// Builds transports from a kind identifier and a configuration.
pub trait TransportFactory: Send + Sync {
    /// Create a transport.
    fn create(&self, kind: &TransportKind, config: &TransportConfig) -> Result<Arc<dyn Transport>>;
}

/// Factory for the built-in SMTP, sendmail and stub transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, kind: &TransportKind, config: &TransportConfig) -> Result<Arc<dyn Transport>> {
        match kind {
            TransportKind::Smtp => {
                let smtp = SmtpConfig::from_transport_config(config)?;
                Ok(Arc::new(SmtpTransport::new(smtp)?))
            }
            TransportKind::Sendmail => Ok(Arc::new(SendmailTransport::new(
                config.get_str("path").map(str::to_string),
            ))),
            TransportKind::Stub => Ok(Arc::new(StubTransport::new())),
            TransportKind::Other(name) => Err(MailError::Config(format!(
                "Unknown transport kind: {}",
                name
            ))),
        }
    }
}

/// SMTP security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtpSecurity {
    /// No encryption (port 25, not recommended).
    None,
    /// STARTTLS upgrade (port 587).
    #[default]
    StartTls,
    /// Implicit TLS (port 465).
    Tls,
}

/// SMTP configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP server host.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// Security mode.
    pub security: SmtpSecurity,
    /// Username for authentication.
    pub username: Option<String>,
    /// Password for authentication.
    pub password: Option<String>,
    /// Connection timeout.
    pub timeout: Duration,
}

impl SmtpConfig {
    /// Create a new SMTP configuration.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 587,
            security: SmtpSecurity::StartTls,
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Read an SMTP configuration from a transport configuration object.
    ///
    /// Recognised keys: `host`, `port`, `secure` (implicit TLS when true),
    /// `security` (`none`, `starttls`, `tls`), `auth.user`, `auth.pass` and
    /// `timeout` in seconds.
    pub fn from_transport_config(config: &TransportConfig) -> Result<Self> {
        let host = config
            .get_str("host")
            .ok_or(MailError::MissingField("host"))?;
        let mut smtp = Self::new(host);

        if config.get("secure").and_then(Value::as_bool) == Some(true) {
            smtp = smtp.tls();
        }
        match config.get_str("security").map(str::to_ascii_lowercase).as_deref() {
            Some("none") => smtp = smtp.insecure(),
            Some("starttls") => smtp = smtp.starttls(),
            Some("tls") => smtp = smtp.tls(),
            Some(other) => {
                return Err(MailError::Config(format!("Unknown SMTP security: {}", other)));
            }
            None => {}
        }
        if let Some(port) = config.get("port").and_then(Value::as_u64) {
            let port = u16::try_from(port)
                .map_err(|_| MailError::Config(format!("SMTP port out of range: {}", port)))?;
            smtp = smtp.port(port);
        }
        if let Some(auth) = config.get("auth") {
            if let (Some(user), Some(pass)) = (
                auth.get("user").and_then(Value::as_str),
                auth.get("pass").and_then(Value::as_str),
            ) {
                smtp = smtp.credentials(user, pass);
            }
        }
        if let Some(secs) = config.get("timeout").and_then(Value::as_u64) {
            smtp = smtp.timeout(Duration::from_secs(secs));
        }

        Ok(smtp)
    }

    /// Set credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Use STARTTLS security (port 587).
    pub fn starttls(mut self) -> Self {
        self.security = SmtpSecurity::StartTls;
        self.port = 587;
        self
    }

    /// Use implicit TLS security (port 465).
    pub fn tls(mut self) -> Self {
        self.security = SmtpSecurity::Tls;
        self.port = 465;
        self
    }

    /// Use no encryption (not recommended).
    pub fn insecure(mut self) -> Self {
        self.security = SmtpSecurity::None;
        self.port = 25;
        self
    }

    /// Set the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// SMTP transport.
pub struct SmtpTransport {
    transport: Mutex<Option<AsyncSmtpTransport<Tokio1Executor>>>,
    config: SmtpConfig,
}

impl SmtpTransport {
    /// Create a new SMTP transport. Connections are opened lazily.
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let mut builder = match config.security {
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?,
        };

        builder = builder.port(config.port).timeout(Some(config.timeout));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let transport = builder.build();

        info!(
            host = %config.host,
            port = config.port,
            security = ?config.security,
            "SMTP transport initialized"
        );

        Ok(Self {
            transport: Mutex::new(Some(transport)),
            config,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    fn handle(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        self.transport
            .lock()
            .clone()
            .ok_or_else(|| MailError::Transport("SMTP transport is closed".to_string()))
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send_mail(&self, options: &MailOptions) -> Result<SentMail> {
        let composed = compose(options)?;
        let envelope = composed.envelope();
        let transport = self.handle()?;

        debug!(to = ?envelope.to, subject = ?options.get_str("subject"), "Sending email via SMTP");

        let response = transport.send(composed.message).await?;
        let line = format!(
            "{} {}",
            response.code(),
            response.message().collect::<Vec<_>>().join(" ")
        );

        debug!(message_id = %composed.message_id, "Email sent successfully");
        Ok(SentMail {
            message_id: Some(composed.message_id),
            envelope,
            message: None,
            response: Some(line),
        })
    }

    async fn close(&self) -> Result<()> {
        // Dropping the handle shuts down the connection pool.
        let closed = self.transport.lock().take();
        if closed.is_some() {
            debug!(host = %self.config.host, "SMTP transport closed");
        }
        Ok(())
    }
}

/// Sendmail transport, piping messages to a local sendmail binary.
pub struct SendmailTransport {
    transport: Mutex<Option<Arc<AsyncSendmailTransport<Tokio1Executor>>>>,
}

impl SendmailTransport {
    /// Create a sendmail transport, optionally with a custom binary path.
    pub fn new(path: Option<String>) -> Self {
        let transport = match &path {
            Some(path) => AsyncSendmailTransport::<Tokio1Executor>::new_with_command(path.clone()),
            None => AsyncSendmailTransport::<Tokio1Executor>::new(),
        };
        info!(path = ?path, "Sendmail transport initialized");
        Self {
            transport: Mutex::new(Some(Arc::new(transport))),
        }
    }
}

#[async_trait]
impl Transport for SendmailTransport {
    async fn send_mail(&self, options: &MailOptions) -> Result<SentMail> {
        let composed = compose(options)?;
        let envelope = composed.envelope();
        let transport = self
            .transport
            .lock()
            .clone()
            .ok_or_else(|| MailError::Transport("sendmail transport is closed".to_string()))?;

        debug!(to = ?envelope.to, "Sending email via sendmail");
        transport.send(composed.message).await?;

        Ok(SentMail {
            message_id: Some(composed.message_id),
            envelope,
            message: None,
            response: None,
        })
    }

    async fn close(&self) -> Result<()> {
        self.transport.lock().take();
        Ok(())
    }
}
