//! Query sanitizer - lexical safety layer for untrusted SQL
//!
//! Turns a caller-supplied SQL string into a [`SafeQuery`]: a single
//! read-only `SELECT` that carries an explicit row bound. The checks are
//! regular expressions over the raw text, not a parser, and run in a fixed
//! order where the first failing rule wins:
//!
//! 1. trim whitespace and one trailing `;` (empty result is rejected)
//! 2. reject anything whose first token is not `SELECT`
//! 3. reject any data/schema-mutating keyword appearing as a whole word,
//!    anywhere in the text (smuggled second statements, sub-clauses)
//! 4. reject SQL comments (`--`, `/*`), which could hide or swallow a LIMIT
//! 5. append `LIMIT <default>` when no `LIMIT <n>` is present
//!
//! Keyword and comment matches inside string literals or quoted identifiers
//! are still matches; such queries are rejected.
//!
//! A lexical `LIMIT <n>` match does not prove the outer statement is bounded
//! (it may sit in a subquery or a literal), so every [`SafeQuery`] also
//! carries a row bound the executor enforces while reading rows.

use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::ValidationError;

static FORBIDDEN_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(INSERT|UPDATE|DELETE|DROP|ALTER|TRUNCATE|CREATE|REPLACE|GRANT|REVOKE)\b",
    )
    .expect("Invalid regex")
});

static SELECT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^SELECT\b").expect("Invalid regex"));

static LIMIT_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(LIMIT\s+)(\d+)\b").expect("Invalid regex"));

/// A validated, read-only, row-bounded statement
///
/// Only [`sanitize`] and [`sanitize_with_cap`] construct one, so holding a
/// `SafeQuery` means the checks above have passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeQuery {
    sql: String,
    default_limit_applied: bool,
    row_bound: u64,
}

impl SafeQuery {
    pub fn as_str(&self) -> &str {
        &self.sql
    }

    pub fn into_inner(self) -> String {
        self.sql
    }

    /// Whether the row bound was supplied by the sanitizer rather than the caller
    pub fn default_limit_applied(&self) -> bool {
        self.default_limit_applied
    }

    /// Most rows the caller may receive for this statement
    pub fn row_bound(&self) -> u64 {
        self.row_bound
    }
}

impl fmt::Display for SafeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

impl AsRef<str> for SafeQuery {
    fn as_ref(&self) -> &str {
        &self.sql
    }
}

/// Validate `candidate` and bound it with `default_limit` if it has no LIMIT
///
/// Explicit LIMITs are kept as written, however large.
pub fn sanitize(candidate: &str, default_limit: u32) -> Result<SafeQuery, ValidationError> {
    sanitize_with_cap(candidate, default_limit, None)
}

/// Like [`sanitize`], but explicit LIMITs above `max_limit` are lowered to it
pub fn sanitize_with_cap(
    candidate: &str,
    default_limit: u32,
    max_limit: Option<u32>,
) -> Result<SafeQuery, ValidationError> {
    let trimmed = candidate.trim();
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyQuery);
    }

    if !SELECT_PREFIX.is_match(trimmed) {
        return Err(ValidationError::NotASelect);
    }

    if let Some(found) = FORBIDDEN_KEYWORDS.find(trimmed) {
        return Err(ValidationError::ForbiddenKeyword(
            found.as_str().to_ascii_uppercase(),
        ));
    }

    if trimmed.contains("--") || trimmed.contains("/*") {
        return Err(ValidationError::CommentNotAllowed);
    }

    if !LIMIT_CLAUSE.is_match(trimmed) {
        return Ok(SafeQuery {
            sql: format!("{} LIMIT {}", trimmed, default_limit),
            default_limit_applied: true,
            row_bound: u64::from(default_limit),
        });
    }

    let sql = match max_limit {
        Some(cap) => clamp_limits(trimmed, cap),
        None => trimmed.to_string(),
    };
    let row_bound = largest_limit(&sql);
    Ok(SafeQuery {
        sql,
        default_limit_applied: false,
        row_bound,
    })
}

/// Largest `LIMIT <n>` in `sql`; digit runs past u64 saturate
fn largest_limit(sql: &str) -> u64 {
    LIMIT_CLAUSE
        .captures_iter(sql)
        .map(|caps| caps[2].parse::<u64>().unwrap_or(u64::MAX))
        .max()
        .unwrap_or(u64::MAX)
}

fn clamp_limits(sql: &str, cap: u32) -> String {
    LIMIT_CLAUSE
        .replace_all(sql, |caps: &Captures| {
            // Digit runs too long for u64 are certainly above the cap.
            let within_cap = caps[2].parse::<u64>().is_ok_and(|n| n <= u64::from(cap));
            if within_cap {
                caps[0].to_string()
            } else {
                tracing::debug!("Clamping LIMIT {} to {}", &caps[2], cap);
                format!("{}{}", &caps[1], cap)
            }
        })
        .into_owned()
}
