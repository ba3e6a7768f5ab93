//! Guardrails policy: table allow-list, blocked patterns and complexity limits.
//!
//! The policy is loaded once at startup and is read-only afterwards. Every
//! loader funnels through [`GuardrailsConfig::from_document`], so a policy
//! built in code is validated exactly like one read from YAML.

use crate::error::{ConfigError, ConfigResult};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_QUERY_LENGTH: usize = 5000;
pub const DEFAULT_MAX_JOINS: usize = 2;
pub const DEFAULT_MAX_SUBQUERIES: usize = 1;

/// Allow-list entry for a single table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub allowed_columns: Vec<String>,
}

/// Numeric ceilings applied to accepted queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityLimits {
    pub max_query_length: usize,
    pub max_joins: usize,
    pub max_subqueries: usize,
}

impl Default for ComplexityLimits {
    fn default() -> Self {
        Self {
            max_query_length: DEFAULT_MAX_QUERY_LENGTH,
            max_joins: DEFAULT_MAX_JOINS,
            max_subqueries: DEFAULT_MAX_SUBQUERIES,
        }
    }
}

/// Master switch for the input normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingProtection {
    pub enabled: bool,
}

impl Default for EncodingProtection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Guardrails document as it appears on disk, before validation.
///
/// `allowed_tables` is optional here only so that its absence can be
/// reported as [`ConfigError::MissingField`] instead of a generic parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardrailsDocument {
    #[serde(default)]
    pub allowed_tables: Option<BTreeMap<String, TableConfig>>,
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
    #[serde(default)]
    pub max_complexity: ComplexityLimits,
    #[serde(default)]
    pub encoding_protection: EncodingProtection,
}

/// A blocked pattern together with its compiled, case-insensitive regex.
#[derive(Debug, Clone)]
pub struct BlockedPattern {
    source: String,
    regex: Regex,
}

impl BlockedPattern {
    fn compile(source: String) -> ConfigResult<Self> {
        let regex = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::InvalidPattern {
                pattern: source.clone(),
                source: e,
            })?;
        Ok(Self { source, regex })
    }

    /// The pattern exactly as written in the policy.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Validated, immutable guardrails policy.
#[derive(Debug, Clone)]
pub struct GuardrailsConfig {
    tables: BTreeMap<String, TableConfig>,
    blocked_patterns: Vec<BlockedPattern>,
    limits: ComplexityLimits,
    encoding_protection: bool,
}

impl GuardrailsConfig {
    pub fn builder() -> GuardrailsConfigBuilder {
        GuardrailsConfigBuilder::default()
    }

    /// Load the policy from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!("Loading guardrails config from {}", path.display());

        let text = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_yaml_str(&text)
    }

    /// Parse the policy from YAML text.
    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        if text.trim().is_empty() {
            return Err(ConfigError::NotAMapping);
        }

        let value: serde_yaml::Value = serde_yaml::from_str(text)?;
        if !value.is_mapping() {
            return Err(ConfigError::NotAMapping);
        }

        let document: GuardrailsDocument = serde_yaml::from_value(value)?;
        Self::from_document(document)
    }

    /// Validate a pre-parsed document and compile its patterns.
    pub fn from_document(document: GuardrailsDocument) -> ConfigResult<Self> {
        let declared = document
            .allowed_tables
            .ok_or(ConfigError::MissingField("allowed_tables".into()))?;

        if declared.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "allowed_tables".into(),
                message: "at least one table must be allowed".into(),
            });
        }

        let mut tables = BTreeMap::new();
        for (name, table) in declared {
            let key = name.trim().to_lowercase();
            if key.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "allowed_tables".into(),
                    message: "table names must not be empty".into(),
                });
            }
            if tables.insert(key.clone(), table).is_some() {
                return Err(ConfigError::InvalidValue {
                    field: "allowed_tables".into(),
                    message: format!("table '{}' is declared more than once", key).into(),
                });
            }
        }

        let limits = document.max_complexity;
        if limits.max_query_length == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_complexity.max_query_length".into(),
                message: "must be greater than 0".into(),
            });
        }

        let blocked_patterns = document
            .blocked_patterns
            .into_iter()
            .map(BlockedPattern::compile)
            .collect::<ConfigResult<Vec<_>>>()?;

        if blocked_patterns.is_empty() {
            warn!("Guardrails config defines no blocked patterns; SQL pattern scan is a no-op");
        }
        if !document.encoding_protection.enabled {
            warn!("Encoding protection is disabled; obfuscated input will not be detected");
        }

        info!(
            "Guardrails config loaded: {} tables, {} blocked patterns, limits {:?}",
            tables.len(),
            blocked_patterns.len(),
            limits
        );

        Ok(Self {
            tables,
            blocked_patterns,
            limits,
            encoding_protection: document.encoding_protection.enabled,
        })
    }

    pub fn is_table_allowed(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_lowercase())
    }

    /// Allowed columns for a table; empty when the table is unknown.
    pub fn columns_for(&self, table: &str) -> &[String] {
        self.tables
            .get(&table.to_lowercase())
            .map(|t| t.allowed_columns.as_slice())
            .unwrap_or(&[])
    }

    pub fn table_description(&self, table: &str) -> Option<&str> {
        self.tables
            .get(&table.to_lowercase())
            .map(|t| t.description.as_str())
    }

    /// Allowed table names, sorted.
    pub fn allowed_tables(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableConfig)> {
        self.tables.iter().map(|(name, table)| (name.as_str(), table))
    }

    pub fn blocked_patterns(&self) -> &[BlockedPattern] {
        &self.blocked_patterns
    }

    pub fn limits(&self) -> ComplexityLimits {
        self.limits
    }

    pub fn encoding_protection_enabled(&self) -> bool {
        self.encoding_protection
    }
}

/// Builder for GuardrailsConfig with fluent API.
#[derive(Default)]
pub struct GuardrailsConfigBuilder {
    document: GuardrailsDocument,
}

impl GuardrailsConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_table<I, S>(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        columns: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.document
            .allowed_tables
            .get_or_insert_with(BTreeMap::new)
            .insert(
                name.into(),
                TableConfig {
                    description: description.into(),
                    allowed_columns: columns.into_iter().map(Into::into).collect(),
                },
            );
        self
    }

    pub fn blocked_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.document.blocked_patterns.push(pattern.into());
        self
    }

    pub fn max_query_length(mut self, length: usize) -> Self {
        self.document.max_complexity.max_query_length = length;
        self
    }

    pub fn max_joins(mut self, joins: usize) -> Self {
        self.document.max_complexity.max_joins = joins;
        self
    }

    pub fn max_subqueries(mut self, subqueries: usize) -> Self {
        self.document.max_complexity.max_subqueries = subqueries;
        self
    }

    pub fn encoding_protection(mut self, enabled: bool) -> Self {
        self.document.encoding_protection.enabled = enabled;
        self
    }

    pub fn build(self) -> ConfigResult<GuardrailsConfig> {
        GuardrailsConfig::from_document(self.document)
    }
}
