//! Query validator.
//!
//! Gates natural-language questions and generated SQL before they reach the
//! analytics agent. Checks run in a fixed order and the first failing check
//! decides the verdict. Rejections are returned as [`ValidationResult`]
//! values, never as errors.
//!
//! Table extraction is a heuristic: only the first identifier after `FROM`
//! and the identifier after each `JOIN` are considered. Aliases, schema
//! qualified names, comma joins, CTEs and tables inside subqueries are not
//! resolved.

use crate::config::GuardrailsConfig;
use crate::error::Result;
use crate::security::normalizer::InputNormalizer;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Mutating SQL keywords refused anywhere in a natural-language question.
pub const DANGEROUS_KEYWORDS: [&str; 7] = [
    "DROP", "DELETE", "TRUNCATE", "ALTER", "CREATE", "INSERT", "UPDATE",
];

/// Regex for the first table after FROM.
static FROM_TABLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bFROM\s+(\w+)").expect("Invalid regex: FROM table pattern"));

/// Regex for the table after each JOIN.
static JOIN_TABLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bJOIN\s+(\w+)").expect("Invalid regex: JOIN table pattern"));

/// Parenthesized text containing SELECT, counted as a subquery.
static SUBQUERY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\([^)]*SELECT[^)]*\)").expect("Invalid regex: subquery pattern")
});

/// Why a query was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    EmptyInput,
    EncodingBypass,
    DangerousKeyword,
    BlockedPattern,
    DisallowedTable,
    ComplexityExceeded,
    LengthExceeded,
}

/// Verdict for a single query.
///
/// Only the validator builds these, so a safe verdict always carries one of
/// the two pass messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    is_safe: bool,
    reason: String,
    blocked_patterns: Vec<String>,
    complexity_issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejection: Option<RejectionKind>,
}

impl ValidationResult {
    pub(crate) fn passed(reason: impl Into<String>) -> Self {
        Self {
            is_safe: true,
            reason: reason.into(),
            blocked_patterns: vec![],
            complexity_issues: vec![],
            rejection: None,
        }
    }

    pub(crate) fn rejected(kind: RejectionKind, reason: impl Into<String>) -> Self {
        Self {
            is_safe: false,
            reason: reason.into(),
            blocked_patterns: vec![],
            complexity_issues: vec![],
            rejection: Some(kind),
        }
    }

    fn with_blocked_patterns(mut self, patterns: Vec<String>) -> Self {
        self.blocked_patterns = patterns;
        self
    }

    fn with_complexity_issues(mut self, issues: Vec<String>) -> Self {
        self.complexity_issues = issues;
        self
    }

    pub fn is_safe(&self) -> bool {
        self.is_safe
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn blocked_patterns(&self) -> &[String] {
        &self.blocked_patterns
    }

    pub fn complexity_issues(&self) -> &[String] {
        &self.complexity_issues
    }

    /// `None` exactly when the query was accepted.
    pub fn rejection(&self) -> Option<RejectionKind> {
        self.rejection
    }
}

/// Validator bound to a loaded guardrails policy.
///
/// Cloning is cheap; the policy is shared.
#[derive(Debug, Clone)]
pub struct GuardrailsValidator {
    config: Arc<GuardrailsConfig>,
    normalizer: InputNormalizer,
}

impl GuardrailsValidator {
    pub fn new(config: GuardrailsConfig) -> Self {
        Self::from_shared(Arc::new(config))
    }

    pub fn from_shared(config: Arc<GuardrailsConfig>) -> Self {
        Self {
            config,
            normalizer: InputNormalizer::new(),
        }
    }

    /// Load the policy file and build a validator for it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(GuardrailsConfig::load(path)?))
    }

    pub fn config(&self) -> &GuardrailsConfig {
        &self.config
    }

    /// Allowed table names, sorted.
    pub fn allowed_tables(&self) -> Vec<&str> {
        self.config.allowed_tables()
    }

    /// Allowed columns for a table; empty when the table is unknown.
    pub fn table_columns(&self, table: &str) -> &[String] {
        self.config.columns_for(table)
    }

    /// Validate a natural-language question.
    #[instrument(skip(self, query), fields(len = query.len()))]
    pub fn validate_natural_language(&self, query: &str) -> ValidationResult {
        debug!("Validating question: {}", preview(query));

        if query.trim().is_empty() {
            return ValidationResult::rejected(RejectionKind::EmptyInput, "Empty query");
        }

        let text = match self.decode(query) {
            Ok(text) => text,
            Err(rejection) => return rejection,
        };

        let upper = text.to_uppercase();
        if let Some(keyword) = DANGEROUS_KEYWORDS.iter().find(|k| upper.contains(*k)) {
            warn!("Dangerous keyword detected: {}", keyword);
            return ValidationResult::rejected(
                RejectionKind::DangerousKeyword,
                format!("Potentially dangerous SQL keyword detected: {}", keyword),
            )
            .with_blocked_patterns(vec![keyword.to_string()]);
        }

        let max_length = self.config.limits().max_query_length;
        if query.chars().count() > max_length {
            warn!("Question exceeds {} characters", max_length);
            return ValidationResult::rejected(
                RejectionKind::LengthExceeded,
                format!("Query too long (max {} characters)", max_length),
            );
        }

        debug!("Question validation passed");
        ValidationResult::passed("Natural language query passed basic validation")
    }

    /// Validate a SQL statement.
    #[instrument(skip(self, sql), fields(len = sql.len()))]
    pub fn validate_sql(&self, sql: &str) -> ValidationResult {
        debug!("Validating SQL: {}", preview(sql));

        if sql.trim().is_empty() {
            return ValidationResult::rejected(RejectionKind::EmptyInput, "Empty SQL query");
        }

        let text = match self.decode(sql) {
            Ok(text) => text,
            Err(rejection) => return rejection,
        };

        let matched: Vec<String> = self
            .config
            .blocked_patterns()
            .iter()
            .filter(|p| p.is_match(&text))
            .map(|p| p.as_str().to_string())
            .collect();

        if !matched.is_empty() {
            warn!("Blocked SQL pattern detected: {:?}", matched);
            return ValidationResult::rejected(
                RejectionKind::BlockedPattern,
                "Blocked SQL pattern detected",
            )
            .with_blocked_patterns(matched);
        }

        let upper = text.trim().to_uppercase();

        let disallowed: Vec<String> = extract_tables(&upper)
            .into_iter()
            .filter(|t| !self.config.is_table_allowed(t))
            .collect();

        if !disallowed.is_empty() {
            warn!("Disallowed tables referenced: {:?}", disallowed);
            let issues = disallowed
                .iter()
                .map(|t| format!("Table not in whitelist: {}", t))
                .collect();
            return ValidationResult::rejected(
                RejectionKind::DisallowedTable,
                format!("Disallowed tables detected: {}", disallowed.join(", ")),
            )
            .with_complexity_issues(issues);
        }

        let issues = self.complexity_issues(sql, &upper);
        if !issues.is_empty() {
            warn!("SQL complexity exceeds limits: {:?}", issues);
            return ValidationResult::rejected(
                RejectionKind::ComplexityExceeded,
                "Query complexity exceeds limits",
            )
            .with_complexity_issues(issues);
        }

        debug!("SQL validation passed");
        ValidationResult::passed("SQL query passed all guardrails")
    }

    /// Normalize the input when encoding protection is on.
    ///
    /// Any finding is a rejection on its own, whatever the decoded text says.
    fn decode<'a>(&self, input: &'a str) -> std::result::Result<Cow<'a, str>, ValidationResult> {
        if !self.config.encoding_protection_enabled() {
            return Ok(Cow::Borrowed(input));
        }

        let normalized = self.normalizer.normalize(input);
        if normalized.is_clean() {
            return Ok(Cow::Owned(normalized.canonical));
        }

        let labels = normalized.labels();
        warn!("Encoding bypass attempt detected: {:?}", labels);
        Err(ValidationResult::rejected(
            RejectionKind::EncodingBypass,
            format!("Encoding bypass attempt detected: {}", labels.join("; ")),
        )
        .with_blocked_patterns(labels))
    }

    /// Every violated ceiling, not just the first.
    fn complexity_issues(&self, raw: &str, upper: &str) -> Vec<String> {
        let limits = self.config.limits();
        let mut issues = Vec::new();

        let join_count = upper.matches("JOIN").count();
        if join_count > limits.max_joins {
            issues.push(format!(
                "Too many JOINs: {} (max {})",
                join_count, limits.max_joins
            ));
        }

        let subquery_count = SUBQUERY_REGEX.find_iter(upper).count();
        if subquery_count > limits.max_subqueries {
            issues.push(format!(
                "Too many subqueries: {} (max {})",
                subquery_count, limits.max_subqueries
            ));
        }

        let length = raw.chars().count();
        if length > limits.max_query_length {
            issues.push(format!(
                "Query too long: {} characters (max {})",
                length, limits.max_query_length
            ));
        }

        issues
    }
}

/// Lower-cased table names after FROM and JOIN, sorted and deduplicated.
pub fn extract_tables(sql: &str) -> BTreeSet<String> {
    let mut tables = BTreeSet::new();

    if let Some(caps) = FROM_TABLE_REGEX.captures(sql) {
        tables.insert(caps[1].to_lowercase());
    }

    for caps in JOIN_TABLE_REGEX.captures_iter(sql) {
        tables.insert(caps[1].to_lowercase());
    }

    tables
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(100) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const REFERENCE_CONFIG: &str = include_str!("../../config/guardrails.yaml");

    fn validator() -> GuardrailsValidator {
        GuardrailsValidator::new(GuardrailsConfig::from_yaml_str(REFERENCE_CONFIG).unwrap())
    }

    fn assert_passed(result: &ValidationResult) {
        assert!(result.is_safe(), "unexpected rejection: {:?}", result);
        assert!(result.blocked_patterns().is_empty());
        assert!(result.complexity_issues().is_empty());
        assert_eq!(result.rejection(), None);
        assert!(
            [
                "Natural language query passed basic validation",
                "SQL query passed all guardrails",
            ]
            .contains(&result.reason())
        );
    }

    #[test]
    fn test_valid_questions() {
        let validator = validator();
        for query in [
            "How many users are there?",
            "Show me users per country",
            "What is the average payment amount?",
            "List all active subscriptions",
        ] {
            let result = validator.validate_natural_language(query);
            assert_passed(&result);
            assert_eq!(
                result.reason(),
                "Natural language query passed basic validation"
            );
        }
    }

    #[test]
    fn test_empty_questions() {
        let validator = validator();
        for query in ["", "   ", "\n\n\n"] {
            let result = validator.validate_natural_language(query);
            assert!(!result.is_safe());
            assert_eq!(result.reason(), "Empty query");
            assert_eq!(result.rejection(), Some(RejectionKind::EmptyInput));
        }
    }

    #[test]
    fn test_dangerous_keywords() {
        let validator = validator();
        let cases = [
            ("DROP TABLE users", "DROP"),
            ("DELETE FROM users", "DELETE"),
            ("TRUNCATE subscriptions", "TRUNCATE"),
            ("ALTER TABLE users ADD COLUMN", "ALTER"),
            ("CREATE TABLE test", "CREATE"),
            ("INSERT INTO users VALUES", "INSERT"),
            ("UPDATE users SET", "UPDATE"),
            ("I want to drop the users table", "DROP"),
            ("Can you delete all subscriptions?", "DELETE"),
        ];

        for (query, keyword) in cases {
            let result = validator.validate_natural_language(query);
            assert!(!result.is_safe(), "query: {}", query);
            assert_eq!(result.blocked_patterns(), [keyword.to_string()]);
            assert_eq!(result.rejection(), Some(RejectionKind::DangerousKeyword));
        }
    }

    #[test]
    fn test_keyword_scan_is_substring_match() {
        let result = validator().validate_natural_language("Which users were created last week?");
        assert!(!result.is_safe());
        assert_eq!(result.blocked_patterns(), ["CREATE".to_string()]);
    }

    #[test]
    fn test_first_keyword_in_list_order_wins() {
        let result = validator().validate_natural_language("update then drop");
        assert_eq!(result.blocked_patterns(), ["DROP".to_string()]);
    }

    #[test]
    fn test_question_length_boundary() {
        let validator = validator();

        let at_limit = "a ".repeat(2500);
        assert_eq!(at_limit.chars().count(), 5000);
        assert_passed(&validator.validate_natural_language(&at_limit));

        let over_limit = format!("{}a", at_limit);
        let result = validator.validate_natural_language(&over_limit);
        assert!(!result.is_safe());
        assert_eq!(result.reason(), "Query too long (max 5000 characters)");
        assert_eq!(result.rejection(), Some(RejectionKind::LengthExceeded));
    }

    #[test]
    fn test_long_repeated_question_rejected() {
        let result = validator().validate_natural_language(&"A".repeat(6000));
        assert!(!result.is_safe());
        assert_eq!(result.rejection(), Some(RejectionKind::LengthExceeded));
    }

    #[test]
    fn test_encoding_bypass_questions() {
        let validator = validator();
        for query in [
            "DROP%20TABLE%20users",
            "DELETE%20FROM%20users",
            "%44%52%4F%50",
            "&lt;script&gt;DROP TABLE users&lt;/script&gt;",
            "DROP&#x20;TABLE&#x20;users",
            r"\x44\x52\x4F\x50",
            r"DROP\x20TABLE",
            "RFJPUCBUQUJMRSB1c2Vycw==",
            "DROP\x00TABLE",
            "DROP\x01TABLE",
            "%44%52%4F%50%20%54%41%42%4C%45",
        ] {
            let result = validator.validate_natural_language(query);
            assert!(!result.is_safe(), "query: {:?}", query);
            assert_eq!(
                result.rejection(),
                Some(RejectionKind::EncodingBypass),
                "query: {:?}",
                query
            );
            assert!(!result.blocked_patterns().is_empty());
        }
    }

    #[test]
    fn test_fullwidth_escapes_rejected_as_encoding() {
        let validator = validator();
        for query in [
            "％44％52％4F％50 the users table",
            "\u{FF05}44\u{FF05}52\u{FF05}4F\u{FF05}50\u{FF05}20TABLE users",
            "＼x44＼x52＼x4F＼x50",
            "＆lt;script＆gt;users",
        ] {
            let result = validator.validate_natural_language(query);
            assert_eq!(
                result.rejection(),
                Some(RejectionKind::EncodingBypass),
                "query: {:?}",
                query
            );
        }

        let result = validator.validate_natural_language("％44％52％4F％50 the users table");
        assert_eq!(result.blocked_patterns(), ["URL encoding detected".to_string()]);
    }

    #[test]
    fn test_fullwidth_escapes_rejected_in_sql() {
        let result = validator().validate_sql("SELECT * FROM users％3B DROP TABLE users");
        assert_eq!(result.rejection(), Some(RejectionKind::EncodingBypass));
        assert_eq!(result.blocked_patterns(), ["URL encoding detected".to_string()]);
    }

    #[test]
    fn test_url_encoded_keyword_reports_encoding() {
        let result = validator().validate_natural_language("DROP%20TABLE%20users");
        assert_eq!(result.blocked_patterns(), ["URL encoding detected".to_string()]);
    }

    #[test]
    fn test_null_byte_split_keyword_rejected_by_encoding_gate() {
        let result = validator().validate_natural_language("DR\x00OP TABLE users");
        assert_eq!(result.rejection(), Some(RejectionKind::EncodingBypass));
        assert_eq!(result.blocked_patterns(), ["Null byte detected".to_string()]);
    }

    #[test]
    fn test_fullwidth_keyword_caught_after_normalization() {
        let result = validator().validate_natural_language("ＤＲＯＰ the users table");
        assert_eq!(result.rejection(), Some(RejectionKind::DangerousKeyword));
        assert_eq!(result.blocked_patterns(), ["DROP".to_string()]);
    }

    #[test]
    fn test_encoding_protection_disabled() {
        let config = GuardrailsConfig::builder()
            .allow_table("users", "", ["user_id"])
            .encoding_protection(false)
            .build()
            .unwrap();
        let validator = GuardrailsValidator::new(config);

        assert_passed(&validator.validate_natural_language("users%20per%20country"));
        // Keyword scan still runs on the raw text
        let result = validator.validate_natural_language("DROP%20TABLE");
        assert_eq!(result.rejection(), Some(RejectionKind::DangerousKeyword));
    }

    #[test]
    fn test_valid_sql() {
        let validator = validator();
        for sql in [
            "SELECT * FROM users",
            "SELECT user_id, country FROM users WHERE country = 'US'",
            "SELECT u.user_id, s.plan FROM users u JOIN subscriptions s ON u.user_id = s.user_id",
            "SELECT * FROM users;",
        ] {
            let result = validator.validate_sql(sql);
            assert_passed(&result);
            assert_eq!(result.reason(), "SQL query passed all guardrails");
        }
    }

    #[test]
    fn test_empty_sql() {
        let result = validator().validate_sql("  \n");
        assert!(!result.is_safe());
        assert_eq!(result.reason(), "Empty SQL query");
    }

    #[test]
    fn test_blocked_sql_patterns() {
        let validator = validator();
        for sql in [
            "DROP TABLE users",
            "DELETE FROM users",
            "SELECT * FROM users UNION SELECT * FROM payments",
            "SELECT * FROM users; DROP TABLE users;",
            "SELECT * FROM users; SELECT * FROM payments;",
            "SELECT * FROM users -- comment",
            "SELECT * FROM users /* comment */",
            "EXEC sp_executesql",
        ] {
            let result = validator.validate_sql(sql);
            assert!(!result.is_safe(), "sql: {}", sql);
            assert_eq!(result.rejection(), Some(RejectionKind::BlockedPattern));
            assert_eq!(result.reason(), "Blocked SQL pattern detected");
        }
    }

    #[test]
    fn test_all_matching_patterns_listed() {
        let result = validator().validate_sql("SELECT * FROM users; DROP TABLE users --");
        let patterns = result.blocked_patterns();
        assert!(patterns.contains(&r";\s*\S".to_string()));
        assert!(patterns.contains(&"--".to_string()));
        assert!(patterns.len() >= 3);
    }

    #[test]
    fn test_disallowed_tables() {
        let validator = validator();

        let result = validator.validate_sql("SELECT * FROM admin_users");
        assert!(!result.is_safe());
        assert_eq!(result.rejection(), Some(RejectionKind::DisallowedTable));
        assert_eq!(
            result.complexity_issues(),
            ["Table not in whitelist: admin_users".to_string()]
        );
        assert_eq!(result.reason(), "Disallowed tables detected: admin_users");

        let result = validator.validate_sql(
            "SELECT * FROM users JOIN secret_data ON 1 = 1 JOIN audit_log ON 1 = 1",
        );
        assert_eq!(
            result.complexity_issues(),
            [
                "Table not in whitelist: audit_log".to_string(),
                "Table not in whitelist: secret_data".to_string(),
            ]
        );
    }

    #[test]
    fn test_table_match_is_case_insensitive() {
        assert_passed(&validator().validate_sql("select * from USERS"));
    }

    #[test]
    fn test_extract_tables() {
        let tables = extract_tables(
            "SELECT * FROM Users u JOIN payments p ON 1 = 1 LEFT JOIN sessions s ON 1 = 1",
        );
        assert_eq!(
            tables.into_iter().collect::<Vec<_>>(),
            vec!["payments", "sessions", "users"]
        );

        // Only the first FROM is considered
        let tables = extract_tables("SELECT * FROM users WHERE id IN (SELECT id FROM secrets)");
        assert_eq!(tables.into_iter().collect::<Vec<_>>(), vec!["users"]);

        // Subselect after FROM: the first identifier after a FROM wins
        let tables = extract_tables("SELECT * FROM (SELECT * FROM payments) t");
        assert_eq!(tables.into_iter().collect::<Vec<_>>(), vec!["payments"]);
    }

    #[test]
    fn test_too_many_joins() {
        let result = validator().validate_sql(
            "SELECT * FROM users JOIN subscriptions ON 1 = 1 JOIN payments ON 1 = 1 JOIN sessions ON 1 = 1",
        );
        assert!(!result.is_safe());
        assert_eq!(result.reason(), "Query complexity exceeds limits");
        assert_eq!(result.rejection(), Some(RejectionKind::ComplexityExceeded));
        assert_eq!(
            result.complexity_issues(),
            ["Too many JOINs: 3 (max 2)".to_string()]
        );
    }

    #[test]
    fn test_complexity_checks_all_reported() {
        let config = GuardrailsConfig::builder()
            .allow_table("users", "", ["user_id"])
            .max_joins(0)
            .max_subqueries(0)
            .build()
            .unwrap();
        let validator = GuardrailsValidator::new(config);

        let result = validator.validate_sql(
            "SELECT * FROM users JOIN users ON 1 = 1 WHERE user_id IN (SELECT user_id FROM users)",
        );
        assert_eq!(
            result.complexity_issues(),
            [
                "Too many JOINs: 1 (max 0)".to_string(),
                "Too many subqueries: 1 (max 0)".to_string(),
            ]
        );
    }

    #[test]
    fn test_nested_subqueries_counted_by_parentheses() {
        let result = validator().validate_sql(
            "SELECT * FROM users WHERE user_id IN (SELECT user_id FROM payments) \
             AND user_id IN (SELECT user_id FROM sessions)",
        );
        assert_eq!(
            result.complexity_issues(),
            ["Too many subqueries: 2 (max 1)".to_string()]
        );
    }

    #[test]
    fn test_sql_length_limit() {
        let config = GuardrailsConfig::builder()
            .allow_table("users", "", ["user_id"])
            .max_query_length(30)
            .build()
            .unwrap();
        let validator = GuardrailsValidator::new(config);

        assert_passed(&validator.validate_sql("SELECT * FROM users"));
        let result = validator.validate_sql("SELECT user_id FROM users WHERE user_id = 1");
        assert_eq!(result.rejection(), Some(RejectionKind::ComplexityExceeded));
        assert_eq!(
            result.complexity_issues(),
            ["Query too long: 43 characters (max 30)".to_string()]
        );
    }

    #[test]
    fn test_encoded_sql_rejected_before_pattern_scan() {
        let result = validator().validate_sql("SELECT * FROM users%3B DROP TABLE users");
        assert_eq!(result.rejection(), Some(RejectionKind::EncodingBypass));
        assert_eq!(result.blocked_patterns(), ["URL encoding detected".to_string()]);
    }

    #[test]
    fn test_homoglyph_table_name_rejected() {
        let result = validator().validate_sql("SELECT * FROM us\u{0435}rs");
        assert_eq!(result.rejection(), Some(RejectionKind::EncodingBypass));
    }

    #[test]
    fn test_load_missing_policy_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = GuardrailsValidator::load(dir.path().join("guardrails.yaml")).unwrap_err();
        assert!(matches!(
            err,
            crate::error::GuardrailsError::Config(crate::error::ConfigError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_allow_list_introspection() {
        let validator = validator();
        assert_eq!(
            validator.allowed_tables(),
            vec!["payments", "sessions", "subscriptions", "users"]
        );
        assert!(
            validator
                .table_columns("payments")
                .contains(&"amount_usd".to_string())
        );
        assert!(validator.table_columns("admin_users").is_empty());
    }

    #[test]
    fn test_result_json_shape() {
        let result = validator().validate_sql("SELECT * FROM admin_users");
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["is_safe"], false);
        assert_eq!(json["rejection"], "disallowed_table");
        assert_eq!(
            json["complexity_issues"][0],
            "Table not in whitelist: admin_users"
        );
        assert!(json["blocked_patterns"].as_array().unwrap().is_empty());

        let passed = validator().validate_sql("SELECT * FROM users");
        let passed = serde_json::to_value(&passed).unwrap();
        assert_eq!(passed["reason"], "SQL query passed all guardrails");
        assert!(passed.get("rejection").is_none());
    }

    #[test]
    fn test_shared_across_threads() {
        let validator = validator();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let validator = validator.clone();
                scope.spawn(move || {
                    assert!(validator.validate_sql("SELECT * FROM users").is_safe());
                    assert!(
                        !validator
                            .validate_natural_language("DROP TABLE users")
                            .is_safe()
                    );
                });
            }
        });
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let text = "é".repeat(150);
        assert_eq!(preview(&text).chars().count(), 100);
        assert_eq!(preview("short"), "short");
    }

    proptest! {
        #[test]
        fn prop_keyword_always_rejected(
            prefix in "[a-z ]{0,20}",
            keyword in prop::sample::select(DANGEROUS_KEYWORDS.to_vec()),
            suffix in "[a-z ]{0,20}",
            lowercase in any::<bool>(),
        ) {
            let keyword_text = if lowercase { keyword.to_lowercase() } else { keyword.to_string() };
            let query = format!("{}{}{}", prefix, keyword_text, suffix);
            let result = validator().validate_natural_language(&query);

            prop_assert!(!result.is_safe());
            prop_assert_eq!(result.rejection(), Some(RejectionKind::DangerousKeyword));
            // An earlier keyword in list order may also be present in the padding
            prop_assert_eq!(result.blocked_patterns().len(), 1);
        }

        #[test]
        fn prop_plain_questions_accepted(words in prop::collection::vec("[a-z]{1,8}", 1..12)) {
            let query = format!("how many {} are there", words.join(" "));
            let upper = query.to_uppercase();
            prop_assume!(!DANGEROUS_KEYWORDS.iter().any(|k| upper.contains(k)));

            let result = validator().validate_natural_language(&query);
            prop_assert!(result.is_safe());
        }
    }
}
