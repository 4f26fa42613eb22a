//! SQL Sanitizer
//!
//! Gate between generated SQL and the database. Rejects anything that looks
//! like a data-mutating statement, requires a SELECT, repairs identifier
//! casing the model tends to lose, and caps the row count.
//!
//! All checks are lexical. A blocked keyword inside a string literal, quoted
//! identifier or comment still rejects the whole statement; false rejection
//! is preferred over false admission.

use crate::error::{NlqError, Result};
use lazy_static::lazy_static;
use regex::{NoExpand, Regex, RegexBuilder};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Row cap appended when the statement carries no LIMIT of its own.
pub const DEFAULT_ROW_LIMIT: u32 = 500;

/// Keywords that reject a statement wherever they appear.
pub const BLOCKED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
];

/// A lower-case identifier spelling and the mixed-case column it stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierFix {
    pub pattern: &'static str,
    pub canonical: &'static str,
}

impl IdentifierFix {
    /// Double-quoted form written into the statement.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.canonical)
    }
}

/// camelCase columns of the invoicing schema. Postgres folds unquoted
/// identifiers to lower case, so these only resolve when quoted.
pub const IDENTIFIER_FIXES: &[IdentifierFix] = &[
    IdentifierFix { pattern: "vendorid", canonical: "vendorId" },
    IdentifierFix { pattern: "invoiceid", canonical: "invoiceId" },
    IdentifierFix { pattern: "customerid", canonical: "customerId" },
    IdentifierFix { pattern: "paymentid", canonical: "paymentId" },
    IdentifierFix { pattern: "totalamount", canonical: "totalAmount" },
    IdentifierFix { pattern: "totalvalue", canonical: "totalValue" },
    IdentifierFix { pattern: "invoicedate", canonical: "invoiceDate" },
];

lazy_static! {
    static ref SHARED: SqlSanitizer = SqlSanitizer::new();
}

/// SQL that passed every guard in [`SqlSanitizer::sanitize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SanitizedSql(String);

impl SanitizedSql {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SanitizedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct CompiledFix {
    regex: Regex,
    replacement: String,
}

pub struct SqlSanitizer {
    mutation_guard: Regex,
    select_guard: Regex,
    limit_guard: Regex,
    fixes: Vec<CompiledFix>,
}

impl SqlSanitizer {
    pub fn new() -> Self {
        Self::with_fixes(IDENTIFIER_FIXES)
    }

    /// Build a sanitizer with a custom identifier table.
    pub fn with_fixes(fixes: &[IdentifierFix]) -> Self {
        let mutation_guard = keyword_regex(&BLOCKED_KEYWORDS.join("|"));
        let select_guard = keyword_regex("SELECT");
        let limit_guard = keyword_regex("LIMIT");

        // Optional surrounding quotes are consumed so an already-quoted
        // identifier is rewritten to itself instead of being quoted twice.
        let fixes = fixes
            .iter()
            .map(|fix| CompiledFix {
                regex: RegexBuilder::new(&format!("\"?{}\"?", regex::escape(fix.pattern)))
                    .case_insensitive(true)
                    .build()
                    .expect("escaped identifier pattern is a valid regex"),
                replacement: fix.quoted(),
            })
            .collect();

        Self {
            mutation_guard,
            select_guard,
            limit_guard,
            fixes,
        }
    }

    /// Validate and normalize raw generated SQL.
    pub fn sanitize(&self, raw: &str) -> Result<SanitizedSql> {
        if let Some(m) = self.mutation_guard.find(raw) {
            warn!(keyword = m.as_str(), "Blocked SQL containing mutation keyword");
            return Err(NlqError::UnsafeSql);
        }
        if !self.select_guard.is_match(raw) {
            warn!("Rejected SQL without a SELECT clause");
            return Err(NlqError::InvalidSql);
        }

        let mut sql = raw.to_string();
        for fix in &self.fixes {
            sql = fix
                .regex
                .replace_all(&sql, NoExpand(&fix.replacement))
                .into_owned();
        }

        if !self.limit_guard.is_match(&sql) {
            let body = sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
            // A line comment at the end would swallow a limit on the same line.
            let separator = match body.lines().last() {
                Some(line) if line.contains("--") => '\n',
                _ => ' ',
            };
            sql = format!("{}{}LIMIT {}", body, separator, DEFAULT_ROW_LIMIT);
            debug!("Appended default row limit");
        }

        Ok(SanitizedSql(sql))
    }
}

impl Default for SqlSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Sanitize with the shared default sanitizer.
pub fn sanitize(raw: &str) -> Result<SanitizedSql> {
    SHARED.sanitize(raw)
}

fn keyword_regex(alternation: &str) -> Regex {
    RegexBuilder::new(&format!(r"\b(?:{})\b", alternation))
        .case_insensitive(true)
        .build()
        .expect("keyword pattern is a valid regex")
}
