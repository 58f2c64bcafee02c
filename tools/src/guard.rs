//! Validation of model-authored SQL before it reaches the database.
//!
//! This is a coarse textual filter, not a parser: a keyword inside a
//! string literal still trips it, and one smuggled past the substring
//! checks is not caught. The database credential should be read-only
//! regardless; the guard exists so the model gets a clear refusal it
//! can recover from.

use std::fmt;

/// Row cap appended to accepted queries that do not limit themselves.
pub const ROW_LIMIT: usize = 5;

const DENYLIST: [&str; 11] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "GRANT", "REVOKE",
    "EXEC", "EXECUTE",
];

/// SQL that passed validation, with the row cap applied when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedSql(String);

impl GuardedSql {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GuardedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Refusal to run a statement. One fixed message regardless of which
/// check tripped, so the model cannot probe the filter piecewise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Only SELECT queries are allowed for security reasons.")]
pub struct Rejected;

/// Validate a candidate statement. Comments are stripped before
/// inspection so keywords cannot hide behind comment syntax; the
/// surviving text must start with SELECT and contain no denylisted
/// keyword. Accepted text gains ` LIMIT 5` unless some LIMIT is already
/// present (an existing larger limit is passed through untouched).
pub fn validate(sql: &str) -> Result<GuardedSql, Rejected> {
    let cleaned = strip_comments(sql).trim().to_uppercase();

    if !cleaned.starts_with("SELECT") {
        return Err(Rejected);
    }

    if DENYLIST.iter().any(|keyword| cleaned.contains(keyword)) {
        return Err(Rejected);
    }

    if sql.to_uppercase().contains("LIMIT") {
        Ok(GuardedSql(sql.to_string()))
    } else {
        Ok(GuardedSql(format!("{sql} LIMIT {ROW_LIMIT}")))
    }
}

/// Remove `--` line comments, then terminated `/* */` blocks. An
/// unterminated block comment is left in place, where its content is
/// still subject to the keyword checks.
fn strip_comments(sql: &str) -> String {
    let without_line = sql
        .lines()
        .map(|line| line.split_once("--").map_or(line, |(code, _)| code))
        .collect::<Vec<_>>()
        .join("\n");

    let mut stripped = String::with_capacity(without_line.len());
    let mut rest = without_line.as_str();
    while let Some(open) = rest.find("/*") {
        let Some(close) = rest[open + 2..].find("*/") else {
            break;
        };
        stripped.push_str(&rest[..open]);
        rest = &rest[open + 2 + close + 2..];
    }
    stripped.push_str(rest);
    stripped
}
