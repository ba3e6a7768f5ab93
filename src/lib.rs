//! Guardrails for queries bound for an LLM-driven analytics agent.
//!
//! Decides whether a natural-language question or a generated SQL statement
//! may be forwarded to the executor. Input is first stripped of encoding
//! layers (percent-encoding, HTML entities, hex escapes, homoglyphs, base64),
//! then checked against keyword and pattern deny-lists, a table allow-list
//! and complexity ceilings.
//!
//! # Example
//!
//! ```
//! use query_guardrails::{GuardrailsConfig, GuardrailsValidator};
//!
//! # fn main() -> Result<(), query_guardrails::error::ConfigError> {
//! let config = GuardrailsConfig::builder()
//!     .allow_table("users", "Registered users", ["user_id", "country"])
//!     .blocked_pattern(r"UNION\s+SELECT")
//!     .build()?;
//! let validator = GuardrailsValidator::new(config);
//!
//! assert!(validator.validate_natural_language("How many users are there?").is_safe());
//! assert!(!validator.validate_natural_language("DROP%20TABLE%20users").is_safe());
//! assert!(!validator.validate_sql("SELECT * FROM admin_users").is_safe());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod security;

pub use config::{ComplexityLimits, GuardrailsConfig, GuardrailsConfigBuilder, TableConfig};
pub use error::{ConfigError, GuardrailsError, Result};
pub use security::{GuardrailsValidator, InputNormalizer, RejectionKind, ValidationResult};
