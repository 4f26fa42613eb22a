//! Statement execution and result materialization

pub mod decode;
pub mod executor;
pub mod result;

pub use executor::{QueryExecutor, SqlExecutionService, DEFAULT_STATEMENT_TIMEOUT};
pub use result::{QueryResult, Row};
