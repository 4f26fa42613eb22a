//! Process configuration, read once at startup from flags, the environment
//! and `.env`.

use crate::execution::DEFAULT_STATEMENT_TIMEOUT;
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT};
use clap::Parser;
use std::fmt;
use std::time::Duration;

#[derive(Parser, Clone)]
#[command(name = "nlq-gateway")]
#[command(about = "Natural-language questions to read-only SQL over HTTP")]
#[command(version)]
pub struct Config {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// API key for the chat completions service
    #[arg(long, env = "GROQ_API_KEY")]
    pub llm_api_key: String,

    /// Model identifier sent with every completion request
    #[arg(long, env = "GROQ_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Base URL of the OpenAI-compatible completions API
    #[arg(long, env = "LLM_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub llm_base_url: String,

    /// Address to bind
    #[arg(long, env = "NLQ_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "VANNA_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Per-statement execution timeout in milliseconds
    #[arg(long, env = "NLQ_STATEMENT_TIMEOUT_MS", default_value_t = DEFAULT_STATEMENT_TIMEOUT.as_millis() as u64)]
    pub statement_timeout_ms: u64,

    /// Completion request timeout in seconds
    #[arg(long, env = "NLQ_LLM_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub llm_timeout_secs: u64,
}

impl Config {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

// Hand-written so secrets never reach the logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &crate::db::redact_url(&self.database_url))
            .field("llm_api_key", &"****")
            .field("model", &self.model)
            .field("llm_base_url", &self.llm_base_url)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("statement_timeout_ms", &self.statement_timeout_ms)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .finish()
    }
}
