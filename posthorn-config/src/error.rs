// Error types for mail configuration loading

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A file could not be read or its format is not supported.
    #[error("Failed to load mail settings: {0}")]
    LoadError(String),

    /// A file or variable is not valid JSON, TOML or env syntax.
    #[error("Failed to parse mail settings: {0}")]
    ParseError(String),

    /// The parsed settings do not describe a mail configuration.
    #[error("Invalid mail settings: {0}")]
    DeserializationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
