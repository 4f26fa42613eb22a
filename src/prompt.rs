//! System prompt for SQL generation.

use crate::db::schema::SchemaDescription;
use crate::security::sql_sanitizer::DEFAULT_ROW_LIMIT;

/// Closed set of invoice statuses the model may filter on.
pub const APPROVED_STATUSES: &[&str] = &["DRAFT", "PENDING", "APPROVED", "PAID", "OVERDUE", "CANCELLED"];

/// Build the generator instruction around a schema snapshot.
///
/// Computed once at startup and shared by every request.
pub fn build_system_prompt(schema: &SchemaDescription) -> String {
    format!(
        r#"You are an expert Postgres SQL generator.
Only output a SINGLE SQL query. Constraints:
- Target ONLY the public schema shown below.
- Use ANSI SQL compatible with PostgreSQL 16.
- NEVER modify data. Only SELECT.
- If dates involved, default to UTC and ISO yyyy-mm-dd.
- Use aggregates when asked for totals/summary.
- LIMIT {limit} by default unless the user asked for a small set.
- Approved statuses: {statuses}.

Schema:
{schema}

Return only SQL. No explanation."#,
        limit = DEFAULT_ROW_LIMIT,
        statuses = APPROVED_STATUSES.join(", "),
        schema = schema.render(),
    )
}
