//! Error types for the guardrails engine.
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `From` conversions.
//! Query rejections are not errors: they are reported as
//! [`ValidationResult`](crate::security::ValidationResult) values.

use std::borrow::Cow;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the guardrails engine.
#[derive(Debug, Error)]
pub enum GuardrailsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read guardrails config {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed guardrails config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Guardrails config must be a mapping at the top level")]
    NotAMapping,

    #[error("Missing required field: {0}")]
    MissingField(Cow<'static, str>),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Invalid blocked pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Result type alias for GuardrailsError.
pub type Result<T> = std::result::Result<T, GuardrailsError>;

/// Result type alias for ConfigError.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
