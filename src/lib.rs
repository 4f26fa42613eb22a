pub mod config;
pub mod db;
pub mod error;
pub mod execution;
pub mod llm;
pub mod nlq;
pub mod prompt;
pub mod security;
pub mod server;

pub use error::{NlqError, Result};
pub use nlq::{NlqRequest, NlqResponse, NlqService};
