//! Schema snapshot used to ground SQL generation.
//!
//! Taken once at startup from `information_schema` and never refreshed.

use crate::db::connection::{connect, redact_url};
use crate::error::{NlqError, Result};
use itertools::Itertools;
use sqlx::Connection;
use tracing::info;

const CATALOG_QUERY: &str = r#"
    SELECT table_name::text, column_name::text, data_type::text
    FROM information_schema.columns
    WHERE table_schema = 'public'
    ORDER BY table_name, ordinal_position
"#;

/// One row of the column catalog.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CatalogColumn {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
}

impl CatalogColumn {
    pub fn new(table_name: &str, column_name: &str, data_type: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            column_name: column_name.to_string(),
            data_type: data_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

/// Tables of the public schema with their columns, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDescription {
    tables: Vec<TableSchema>,
}

impl SchemaDescription {
    /// Group catalog rows by table. Rows are expected in table order; a table
    /// that shows up again later is merged into its first occurrence.
    pub fn from_columns(columns: impl IntoIterator<Item = CatalogColumn>) -> Self {
        let mut tables: Vec<TableSchema> = Vec::new();
        let grouped = columns.into_iter().group_by(|c| c.table_name.clone());
        for (table_name, group) in &grouped {
            let cols = group.map(|c| ColumnSchema {
                name: c.column_name,
                data_type: c.data_type,
            });
            match tables.iter_mut().find(|t| t.name == table_name) {
                Some(existing) => existing.columns.extend(cols),
                None => tables.push(TableSchema {
                    name: table_name,
                    columns: cols.collect(),
                }),
            }
        }
        Self { tables }
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// `table(col type, col type)` per line.
    pub fn render(&self) -> String {
        self.tables
            .iter()
            .map(|t| {
                let cols = t
                    .columns
                    .iter()
                    .map(|c| format!("{} {}", c.name, c.data_type))
                    .join(", ");
                format!("{}({})", t.name, cols)
            })
            .join("\n")
    }
}

/// Read the public schema's column catalog in a single round trip.
pub async fn snapshot(database_url: &str) -> Result<SchemaDescription> {
    let target = redact_url(database_url);
    let mut conn = connect(database_url).await.map_err(|e| {
        NlqError::Schema(format!("Failed to connect to {}: {}", target, e))
    })?;

    let columns: Vec<CatalogColumn> = sqlx::query_as(CATALOG_QUERY)
        .fetch_all(&mut conn)
        .await
        .map_err(|e| NlqError::Schema(format!("Failed to read column catalog: {}", e)))?;

    // Best effort; the snapshot is already in hand.
    let _ = conn.close().await;

    let schema = SchemaDescription::from_columns(columns);
    info!(
        tables = schema.table_count(),
        database = %target,
        "Captured schema snapshot"
    );
    Ok(schema)
}
