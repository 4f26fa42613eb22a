//! Read-only, time-bounded statement execution against Postgres.

use super::decode::row_to_json;
use super::result::QueryResult;
use crate::db::connection::connect;
use crate::error::{NlqError, Result};
use crate::security::SanitizedSql;
use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::{Column, Connection, Executor, Row};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(8);

/// Runs one sanitized statement and materializes its rows.
#[async_trait]
pub trait SqlExecutionService: Send + Sync {
    async fn execute(&self, sql: &SanitizedSql) -> Result<QueryResult>;
}

#[async_trait]
impl<T: SqlExecutionService + ?Sized> SqlExecutionService for Arc<T> {
    async fn execute(&self, sql: &SanitizedSql) -> Result<QueryResult> {
        (**self).execute(sql).await
    }
}

/// Opens a fresh connection per statement. The session is read-only and
/// statement-timed, so nothing the sanitizer misses can write or run long.
pub struct QueryExecutor {
    database_url: String,
    statement_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(database_url: String) -> Self {
        Self::with_timeout(database_url, DEFAULT_STATEMENT_TIMEOUT)
    }

    pub fn with_timeout(database_url: String, statement_timeout: Duration) -> Self {
        Self {
            database_url,
            statement_timeout,
        }
    }

    pub fn statement_timeout(&self) -> Duration {
        self.statement_timeout
    }
}

#[async_trait]
impl SqlExecutionService for QueryExecutor {
    async fn execute(&self, sql: &SanitizedSql) -> Result<QueryResult> {
        let started = Instant::now();
        let mut conn = connect(&self.database_url).await.map_err(execution_error)?;

        let result = run_read_only(&mut conn, sql.as_str(), self.statement_timeout).await;

        // The transaction is already gone; a failed close only loses the socket early.
        if let Err(e) = conn.close().await {
            warn!(error = %e, "Failed to close database connection cleanly");
        }

        match &result {
            Ok(r) => info!(
                rows = r.row_count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Executed query"
            ),
            Err(e) => warn!(error = %e, "Query execution failed"),
        }
        result
    }
}

async fn run_read_only(
    conn: &mut PgConnection,
    sql: &str,
    statement_timeout: Duration,
) -> Result<QueryResult> {
    let mut tx = conn.begin().await.map_err(execution_error)?;

    (&mut *tx)
        .execute("SET TRANSACTION READ ONLY")
        .await
        .map_err(execution_error)?;
    (&mut *tx)
        .execute(timeout_statement(statement_timeout).as_str())
        .await
        .map_err(execution_error)?;

    let rows = sqlx::query(sql)
        .fetch_all(&mut *tx)
        .await
        .map_err(execution_error)?;

    let columns = match rows.first() {
        Some(first) => first
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect(),
        None => (&mut *tx)
            .describe(sql)
            .await
            .map_err(execution_error)?
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect(),
    };
    let rows = rows.iter().map(row_to_json).collect();

    tx.rollback().await.map_err(execution_error)?;
    Ok(QueryResult::new(columns, rows))
}

fn timeout_statement(timeout: Duration) -> String {
    format!("SET LOCAL statement_timeout = {}", timeout.as_millis())
}

/// Surface the database's own message when there is one.
fn execution_error(e: sqlx::Error) -> NlqError {
    let message = match e.as_database_error() {
        Some(db) => db.message().to_string(),
        None => e.to_string(),
    };
    NlqError::Execution(message)
}
