//! Query Result - materialized rows of one executed statement

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One result row, keyed by column name in column order.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names from the result descriptor. Empty when the statement
    /// produced no result set.
    pub columns: Vec<String>,

    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
