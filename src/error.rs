use thiserror::Error;

#[derive(Error, Debug)]
pub enum NlqError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema snapshot error: {0}")]
    Schema(String),

    #[error("LLM error: {0}")]
    Generation(String),

    #[error("Unsafe SQL blocked. Only SELECT allowed.")]
    UnsafeSql,

    #[error("Only SELECT queries are allowed.")]
    InvalidSql,

    #[error("SQL error: {0}")]
    Execution(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NlqError {
    /// HTTP status surfaced to the caller for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            NlqError::UnsafeSql
            | NlqError::InvalidSql
            | NlqError::Execution(_)
            | NlqError::BadRequest(_) => 400,
            NlqError::Config(_)
            | NlqError::Schema(_)
            | NlqError::Generation(_)
            | NlqError::Io(_)
            | NlqError::Json(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, NlqError>;
