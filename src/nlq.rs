//! Natural-language question → SQL → rows.

use crate::error::{NlqError, Result};
use crate::execution::{QueryResult, Row, SqlExecutionService};
use crate::llm::{SqlGenerator, TextCompletionService};
use crate::security::{SanitizedSql, SqlSanitizer};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct NlqRequest {
    pub question: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NlqResponse {
    pub question: String,
    pub sql: SanitizedSql,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Generate, sanitize, execute. The first failing stage ends the request;
/// nothing is retried or cached.
pub struct NlqService<C, E> {
    generator: SqlGenerator<C>,
    sanitizer: SqlSanitizer,
    executor: E,
}

impl<C, E> NlqService<C, E>
where
    C: TextCompletionService,
    E: SqlExecutionService,
{
    pub fn new(generator: SqlGenerator<C>, sanitizer: SqlSanitizer, executor: E) -> Self {
        Self {
            generator,
            sanitizer,
            executor,
        }
    }

    pub async fn handle(&self, question: &str) -> Result<NlqResponse> {
        if question.trim().is_empty() {
            return Err(NlqError::BadRequest("question is required".to_string()));
        }

        let raw_sql = self.generator.generate(question).await?;
        let sql = self.sanitizer.sanitize(&raw_sql)?;
        info!(sql = %sql, "Sanitized SQL");

        let QueryResult { columns, rows } = self.executor.execute(&sql).await?;

        Ok(NlqResponse {
            question: question.to_string(),
            sql,
            columns,
            rows,
        })
    }
}
