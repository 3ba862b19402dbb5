// Mail transport configuration from files and the environment

pub mod env;
pub mod error;
pub mod loader;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};

use posthorn_mail::MailConfig;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable prefix used by [`MailSettings::from_env`].
pub const DEFAULT_PREFIX: &str = "POSTHORN_MAIL";

/// Key under which a shared configuration file may nest the mail section.
pub const SECTION: &str = "mail";

/// Builder assembling a [`MailConfig`] from files and environment variables.
///
/// Sources are applied in order: `.env` file, configuration files, then
/// environment variables. Later sources replace top-level keys
/// (`transport`, `config`, `defaults`) set by earlier ones.
pub struct MailSettings {
    prefix: String,
    load_env: bool,
    load_dotenv: bool,
    dotenv_path: Option<PathBuf>,
    files: Vec<PathBuf>,
}

impl MailSettings {
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            load_env: false,
            load_dotenv: false,
            dotenv_path: None,
            files: Vec::new(),
        }
    }

    /// Set environment variable prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Enable loading from environment variables
    pub fn load_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Enable loading from a .env file (implies [`MailSettings::load_env`])
    pub fn load_dotenv(mut self, path: Option<PathBuf>) -> Self {
        self.load_dotenv = true;
        self.load_env = true;
        self.dotenv_path = path;
        self
    }

    /// Add configuration file to load
    pub fn add_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Build the mail configuration
    pub fn build(self) -> Result<MailConfig> {
        if self.load_dotenv {
            match self.dotenv_path {
                Some(ref path) => {
                    dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
                }
                None => {
                    dotenvy::dotenv().ok(); // Ignore if .env doesn't exist
                }
            }
        }

        let env = EnvLoader::new(Some(self.prefix.clone()));
        let mut merged = Map::new();

        for path in &self.files {
            let value = read_file(path, &env)?;
            extend(&mut merged, value);
        }

        if self.load_env {
            let vars = env.load()?;
            extend(&mut merged, vars_to_value(&vars)?);
        }

        Self::from_value(Value::Object(merged))
    }

    /// Load a [`MailConfig`] from a JSON, TOML or env file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<MailConfig> {
        let env = EnvLoader::new(Some(DEFAULT_PREFIX.to_string()));
        Self::from_value(read_file(path.as_ref(), &env)?)
    }

    /// Load a [`MailConfig`] from `POSTHORN_MAIL_*` environment variables.
    pub fn from_env() -> Result<MailConfig> {
        Self::new().load_env().build()
    }

    /// Load a `.env` file, then read the environment.
    pub fn from_dotenv(path: Option<PathBuf>) -> Result<MailConfig> {
        Self::new().load_dotenv(path).build()
    }

    /// Build a [`MailConfig`] from prefix-stripped, lowercased variables.
    ///
    /// `config` is parsed as JSON when it is valid JSON and kept as a string
    /// otherwise. `defaults` must be a JSON object.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<MailConfig> {
        Self::from_value(vars_to_value(vars)?)
    }

    /// Deserialize a [`MailConfig`], looking inside a `mail` section when
    /// present.
    pub fn from_value(value: Value) -> Result<MailConfig> {
        let value = match value {
            Value::Object(mut map) if matches!(map.get(SECTION), Some(Value::Object(_))) => {
                map.remove(SECTION).unwrap_or(Value::Null)
            }
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        let config: MailConfig = serde_json::from_value(value)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;

        debug!(transport = %config.transport, "Loaded mail settings");
        Ok(config)
    }
}

impl Default for MailSettings {
    fn default() -> Self {
        Self::new()
    }
}

fn read_file(path: &Path, env: &EnvLoader) -> Result<Value> {
    let loader = ConfigLoader::auto(path)?;
    let value = loader.load_file(path)?;

    if loader.format() != FileFormat::Env {
        return Ok(value);
    }

    let pairs = match value {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
            .collect::<Vec<_>>(),
        _ => Vec::new(),
    };
    vars_to_value(&env.collect(pairs))
}

fn vars_to_value(vars: &HashMap<String, String>) -> Result<Value> {
    let mut map = Map::new();

    if let Some(transport) = vars.get("transport") {
        map.insert("transport".to_string(), Value::String(transport.clone()));
    }

    if let Some(config) = vars.get("config") {
        let value = serde_json::from_str(config).unwrap_or_else(|_| Value::String(config.clone()));
        map.insert("config".to_string(), value);
    }

    if let Some(defaults) = vars.get("defaults") {
        let value: Value = serde_json::from_str(defaults)
            .map_err(|e| ConfigError::ParseError(format!("defaults: {}", e)))?;
        if !value.is_object() {
            return Err(ConfigError::ParseError(
                "defaults must be a JSON object".to_string(),
            ));
        }
        map.insert("defaults".to_string(), value);
    }

    Ok(Value::Object(map))
}

fn extend(dest: &mut Map<String, Value>, value: Value) {
    let section = match value {
        Value::Object(mut map) => match map.remove(SECTION) {
            Some(Value::Object(inner)) => inner,
            Some(other) => {
                map.insert(SECTION.to_string(), other);
                map
            }
            None => map,
        },
        _ => return,
    };
    dest.extend(section);
}

#[cfg(test)]
mod tests {
    use super::*;
    use posthorn_mail::{TransportConfig, TransportKind};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_value() {
        let config = MailSettings::from_value(json!({
            "transport": "SMTP",
            "config": {"host": "smtp.example.com"},
            "defaults": {"from": "noreply@example.com"}
        }))
        .unwrap();

        assert_eq!(config.transport, TransportKind::Smtp);
        assert_eq!(config.config.get_str("host"), Some("smtp.example.com"));
        assert_eq!(
            config.defaults.unwrap().get_str("from"),
            Some("noreply@example.com")
        );
    }

    #[test]
    fn test_from_value_mail_section() {
        let config = MailSettings::from_value(json!({
            "server": {"port": 8080},
            "mail": {"transport": "sendmail"}
        }))
        .unwrap();

        assert_eq!(config.transport, TransportKind::Sendmail);
    }

    #[test]
    fn test_from_value_null() {
        let config = MailSettings::from_value(Value::Null).unwrap();
        assert_eq!(config, MailConfig::default());
    }

    #[test]
    fn test_from_value_bad_defaults() {
        let result = MailSettings::from_value(json!({"defaults": 3}));
        assert!(matches!(result, Err(ConfigError::DeserializationError(_))));
    }

    #[test]
    fn test_from_vars() {
        let config = MailSettings::from_vars(&vars(&[
            ("transport", "smtp"),
            ("config", r#"{"host": "localhost", "port": 2525}"#),
            ("defaults", r#"{"subject": "Hi"}"#),
        ]))
        .unwrap();

        assert_eq!(config.config.get("port"), Some(&json!(2525)));
        assert_eq!(config.defaults.unwrap().get_str("subject"), Some("Hi"));
    }

    #[test]
    fn test_from_vars_plain_config_string() {
        let config =
            MailSettings::from_vars(&vars(&[("config", "smtp://localhost:2525")])).unwrap();
        assert_eq!(
            config.config,
            TransportConfig::from(json!("smtp://localhost:2525"))
        );
    }

    #[test]
    fn test_from_vars_defaults_not_object() {
        let result = MailSettings::from_vars(&vars(&[("defaults", "[1]")]));
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_from_toml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.toml");
        fs::write(
            &path,
            r#"
            [mail]
            transport = "sendmail"

            [mail.config]
            path = "/usr/sbin/sendmail"
            "#,
        )
        .unwrap();

        let config = MailSettings::from_file(&path).unwrap();
        assert_eq!(config.transport, TransportKind::Sendmail);
        assert_eq!(config.config.get_str("path"), Some("/usr/sbin/sendmail"));
    }

    #[test]
    fn test_from_env_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mail.env");
        fs::write(
            &path,
            "POSTHORN_MAIL_TRANSPORT=stub\nPOSTHORN_MAIL_DEFAULTS={\"from\": \"a@example.com\"}\nOTHER=1\n",
        )
        .unwrap();

        let config = MailSettings::from_file(&path).unwrap();
        assert_eq!(config.transport, TransportKind::Stub);
        assert_eq!(
            config.defaults.unwrap().get_str("from"),
            Some("a@example.com")
        );
    }

    #[test]
    fn test_builder_later_files_win() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("base.json");
        let local = dir.path().join("local.json");
        fs::write(&base, r#"{"transport": "smtp", "config": {"host": "a"}}"#).unwrap();
        fs::write(&local, r#"{"config": {"host": "b"}}"#).unwrap();

        let config = MailSettings::new()
            .add_file(&base)
            .add_file(&local)
            .build()
            .unwrap();

        assert_eq!(config.transport, TransportKind::Smtp);
        assert_eq!(config.config.get_str("host"), Some("b"));
    }

    #[test]
    fn test_missing_file() {
        let result = MailSettings::from_file("/nonexistent/mail.json");
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }
}
