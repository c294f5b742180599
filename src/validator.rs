//! Statement classification and validation.
//!
//! A textual heuristic, not a SQL parser. Two checks run against a
//! de-commented, upper-cased copy of the statement:
//!
//! 1. a whole-word denylist of statement kinds (`DROP`, `DELETE`, ...)
//! 2. a substring check for SQL Server system procedure prefixes
//!    (`SP_`, `XP_`, `FN_`)
//!
//! Classification looks only at the first whitespace-delimited token of the
//! trimmed statement. Text holding several statements is classified by the
//! first one, and SQLite and SQL Server run all of them, so a statement
//! outside the denylist (`PRAGMA`, `ATTACH`, ...) can follow a `SELECT`.

use regex::{Captures, Regex};
use thiserror::Error;

/// Statement kinds rejected by default, matched as whole words.
pub const DENIED_KEYWORDS: &[&str] = &[
    "DROP", "TRUNCATE", "ALTER", "CREATE", "GRANT", "REVOKE", "EXEC", "EXECUTE", "DELETE",
    "UPDATE", "INSERT",
];

/// Substrings that mark system procedure or function calls.
pub const SYSTEM_PROCEDURE_PREFIXES: &[&str] = &["SP_", "XP_", "FN_"];

/// Why a statement was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("query is empty")]
    Empty,

    #[error("dangerous keyword found: {0}")]
    DangerousKeyword(String),

    #[error("SQL Server system procedures not allowed")]
    SystemProcedure,
}

/// How a statement's result has to be shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Produces rows.
    Read,
    /// Produces an affected-row count.
    Write,
    /// Never executed.
    Unknown,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Read => "READ",
            QueryKind::Write => "WRITE",
            QueryKind::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a statement by its leading keyword.
///
/// `WITH` is treated as a read whatever the auxiliary expression contains.
///
/// # Example
///
/// ```
/// use sqlgate::validator::{classify, QueryKind};
///
/// assert_eq!(classify("  select * from users"), QueryKind::Read);
/// assert_eq!(classify("UPDATE users SET a = 1"), QueryKind::Write);
/// assert_eq!(classify("VACUUM"), QueryKind::Unknown);
/// ```
pub fn classify(sql: &str) -> QueryKind {
    let Some(first) = sql.split_whitespace().next() else {
        return QueryKind::Unknown;
    };

    match first.to_uppercase().as_str() {
        "SELECT" | "WITH" => QueryKind::Read,
        "INSERT" | "UPDATE" | "DELETE" => QueryKind::Write,
        _ => QueryKind::Unknown,
    }
}

/// Validator holding the compiled denylist and comment scanner.
#[derive(Debug, Clone)]
pub struct QueryValidator {
    denied: Vec<(String, Regex)>,
    /// Matches quoted literals and identifiers (kept) and comments (removed)
    /// in one pass.
    comments: Regex,
}

impl Default for QueryValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryValidator {
    /// Create a validator with the default denylist.
    pub fn new() -> Self {
        Self::with_denied_keywords(DENIED_KEYWORDS.iter().copied())
    }

    /// Create a validator with a custom denylist.
    ///
    /// Keywords are upper-cased and matched as whole words. Blank entries are
    /// ignored.
    pub fn with_denied_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let denied = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_uppercase())
            .filter(|k| !k.is_empty())
            .map(|k| {
                let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(&k)))
                    .expect("escaped keyword is a valid pattern");
                (k, pattern)
            })
            .collect();

        Self {
            denied,
            comments: Regex::new(
                r#"(?s)'(?:[^']|'')*'|"(?:[^"]|"")*"|`(?:[^`]|``)*`|\[[^\]]*\]|--[^\n]*|/\*(?:[^!].*?)?\*/"#,
            )
            .expect("comment pattern is valid"),
        }
    }

    /// The keywords this validator refuses, in check order.
    pub fn denied_keywords(&self) -> impl Iterator<Item = &str> {
        self.denied.iter().map(|(k, _)| k.as_str())
    }

    /// Check a statement against the denylist and the procedure prefixes.
    ///
    /// Order: empty check, denylist (first listed keyword wins), procedure
    /// prefixes.
    pub fn validate(&self, sql: &str) -> Result<(), ValidationError> {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty);
        }

        let upper = self.strip_comments(trimmed).to_uppercase();

        if let Some((keyword, _)) = self.denied.iter().find(|(_, re)| re.is_match(&upper)) {
            return Err(ValidationError::DangerousKeyword(keyword.clone()));
        }

        if SYSTEM_PROCEDURE_PREFIXES.iter().any(|p| upper.contains(p)) {
            return Err(ValidationError::SystemProcedure);
        }

        Ok(())
    }

    /// Validate, then classify. `Unknown` is returned as-is; rejecting it is
    /// the caller's job.
    pub fn check(&self, sql: &str) -> Result<QueryKind, ValidationError> {
        self.validate(sql)?;
        Ok(classify(sql))
    }

    /// Remove `--` and `/* */` comments, leaving quoted literals and
    /// `"..."`, `` `...` `` and `[...]` identifiers untouched.
    ///
    /// `/*! */` bodies are executed by MySQL, so they are not comments here.
    pub fn strip_comments(&self, sql: &str) -> String {
        self.comments
            .replace_all(sql, |caps: &Captures| {
                let m = &caps[0];
                if m.starts_with(['\'', '"', '`', '[']) {
                    m.to_string()
                } else {
                    " ".to_string()
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rejected(sql: &str) -> ValidationError {
        QueryValidator::new().validate(sql).unwrap_err()
    }

    #[test]
    fn test_classify_reads() {
        assert_eq!(classify("SELECT 1"), QueryKind::Read);
        assert_eq!(classify("\n\tselect id from users"), QueryKind::Read);
        assert_eq!(
            classify("WITH t AS (SELECT 1) SELECT * FROM t"),
            QueryKind::Read
        );
    }

    #[test]
    fn test_classify_writes() {
        assert_eq!(classify("INSERT INTO t VALUES (1)"), QueryKind::Write);
        assert_eq!(classify("update t set a = 1"), QueryKind::Write);
        assert_eq!(classify("Delete FROM t"), QueryKind::Write);
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(classify(""), QueryKind::Unknown);
        assert_eq!(classify("   "), QueryKind::Unknown);
        assert_eq!(classify("SHOW TABLES"), QueryKind::Unknown);
        assert_eq!(classify("SELECT(1)"), QueryKind::Unknown);
        assert_eq!(classify("/* c */ SELECT 1"), QueryKind::Unknown);
    }

    #[test]
    fn test_plain_select_passes() {
        let validator = QueryValidator::new();
        assert_eq!(validator.check("SELECT 1"), Ok(QueryKind::Read));
        assert_eq!(
            validator.check("SELECT dropped_at, created_by FROM audit"),
            Ok(QueryKind::Read)
        );
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(rejected(""), ValidationError::Empty);
        assert_eq!(rejected(" \n\t "), ValidationError::Empty);
    }

    #[test]
    fn test_denied_keywords() {
        assert_eq!(
            rejected("DROP TABLE users"),
            ValidationError::DangerousKeyword("DROP".into())
        );
        assert_eq!(
            rejected("select 1; truncate logs"),
            ValidationError::DangerousKeyword("TRUNCATE".into())
        );
        assert_eq!(
            rejected("EXECUTE proc"),
            ValidationError::DangerousKeyword("EXECUTE".into())
        );
        assert_eq!(
            rejected("INSERT INTO t VALUES (1)"),
            ValidationError::DangerousKeyword("INSERT".into())
        );
    }

    #[test]
    fn test_first_listed_keyword_wins() {
        assert_eq!(
            rejected("DELETE FROM t; DROP TABLE t"),
            ValidationError::DangerousKeyword("DROP".into())
        );
    }

    #[test]
    fn test_keyword_inside_comment_is_ignored() {
        let validator = QueryValidator::new();
        assert!(validator.validate("SELECT 1 -- DROP").is_ok());
        assert!(validator.validate("SELECT 1 /* DROP TABLE users */").is_ok());
        assert!(validator.validate("SELECT 1 -- drop\nFROM t").is_ok());
        assert!(validator.validate("SELECT /* multi\nline DELETE */ 1").is_ok());
    }

    #[test]
    fn test_comment_does_not_hide_following_statement() {
        assert_eq!(
            rejected("SELECT 1 /* note */; DROP TABLE t"),
            ValidationError::DangerousKeyword("DROP".into())
        );
        assert_eq!(
            rejected("SELECT 1 -- note\n; DROP TABLE t"),
            ValidationError::DangerousKeyword("DROP".into())
        );
        // A block comment opened inside a line comment is not a block comment.
        assert_eq!(
            rejected("SELECT 1 -- /*\nDROP TABLE t -- */"),
            ValidationError::DangerousKeyword("DROP".into())
        );
        // A line-comment marker inside a block comment does not eat the line.
        assert_eq!(
            rejected("SELECT 1 /* -- */; DROP TABLE t"),
            ValidationError::DangerousKeyword("DROP".into())
        );
    }

    #[test]
    fn test_comment_markers_in_literals_are_not_comments() {
        assert_eq!(
            rejected("SELECT '--' AS x; DROP TABLE t"),
            ValidationError::DangerousKeyword("DROP".into())
        );
        assert_eq!(
            rejected("SELECT '/*' ; DELETE FROM t; SELECT '*/'"),
            ValidationError::DangerousKeyword("DELETE".into())
        );
    }

    #[test]
    fn test_comment_markers_in_quoted_identifiers_are_not_comments() {
        assert_eq!(
            rejected("SELECT 1 AS [a--b]; DROP TABLE users"),
            ValidationError::DangerousKeyword("DROP".into())
        );
        assert_eq!(
            rejected("SELECT 1 AS `a--b`; DROP TABLE users"),
            ValidationError::DangerousKeyword("DROP".into())
        );
        assert_eq!(
            rejected("SELECT 1 AS [/*]; DROP TABLE users; SELECT 2 AS [*/]"),
            ValidationError::DangerousKeyword("DROP".into())
        );
        assert_eq!(
            rejected("SELECT 1 AS `a``/*`; DELETE FROM t -- */"),
            ValidationError::DangerousKeyword("DELETE".into())
        );
    }

    #[test]
    fn test_trailing_statement_outside_denylist_passes() {
        let validator = QueryValidator::new();
        assert_eq!(
            validator.check("SELECT 1; PRAGMA writable_schema=1"),
            Ok(QueryKind::Read)
        );
        assert_eq!(
            validator.check("SELECT 1; ATTACH DATABASE '/tmp/x' AS x"),
            Ok(QueryKind::Read)
        );
    }

    #[test]
    fn test_mysql_executable_comment_is_scanned() {
        assert_eq!(
            rejected("SELECT 1 /*!50000 DROP TABLE t */"),
            ValidationError::DangerousKeyword("DROP".into())
        );
    }

    #[test]
    fn test_unterminated_comment_is_scanned() {
        assert_eq!(
            rejected("SELECT 1 /* DROP TABLE t"),
            ValidationError::DangerousKeyword("DROP".into())
        );
    }

    #[test]
    fn test_system_procedure_prefixes() {
        assert_eq!(rejected("SELECT dbo.myFn_helper()"), ValidationError::SystemProcedure);
        assert_eq!(rejected("select * from sp_who"), ValidationError::SystemProcedure);
        assert_eq!(rejected("SELECT xp_cmdshell"), ValidationError::SystemProcedure);
    }

    #[test]
    fn test_denylist_checked_before_procedures() {
        assert_eq!(
            rejected("EXEC sp_configure"),
            ValidationError::DangerousKeyword("EXEC".into())
        );
    }

    #[test]
    fn test_custom_denylist_allows_writes() {
        let validator = QueryValidator::with_denied_keywords(["drop", " truncate ", ""]);
        assert_eq!(
            validator.denied_keywords().collect::<Vec<_>>(),
            vec!["DROP", "TRUNCATE"]
        );
        assert_eq!(
            validator.check("INSERT INTO t VALUES (1)"),
            Ok(QueryKind::Write)
        );
        assert_eq!(
            validator.check("drop table t"),
            Err(ValidationError::DangerousKeyword("DROP".into()))
        );
    }

    #[test]
    fn test_unknown_statements_pass_validation() {
        assert_eq!(QueryValidator::new().check("SHOW TABLES"), Ok(QueryKind::Unknown));
    }

    #[test]
    fn test_strip_comments_keeps_literals() {
        let validator = QueryValidator::new();
        assert_eq!(
            validator.strip_comments("SELECT 'a--b', \"c/*d*/\" -- tail"),
            "SELECT 'a--b', \"c/*d*/\"  "
        );
        assert_eq!(validator.strip_comments("SELECT/**/1"), "SELECT 1");
        assert_eq!(
            validator.strip_comments("SELECT [a--b], `c/*d` -- tail"),
            "SELECT [a--b], `c/*d`  "
        );
    }
}
