//! Database module for PostgreSQL connectivity and schema introspection

pub mod connection;
pub mod schema;

pub use connection::{connect, redact_url};
pub use schema::{snapshot, CatalogColumn, SchemaDescription};
