use nlq_gateway::config::Config;
use nlq_gateway::db::{self, redact_url};
use nlq_gateway::execution::QueryExecutor;
use nlq_gateway::llm::{LlmClient, SqlGenerator};
use nlq_gateway::nlq::NlqService;
use nlq_gateway::prompt::build_system_prompt;
use nlq_gateway::security::SqlSanitizer;
use nlq_gateway::server;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    info!(database = %redact_url(&config.database_url), model = %config.model, "Starting nlq-gateway");

    // The generator is useless without schema context, so a failed snapshot aborts startup.
    let schema = db::snapshot(&config.database_url)
        .await
        .context("Schema snapshot failed; refusing to serve")?;
    if schema.is_empty() {
        warn!("Public schema has no tables; generated SQL will have nothing to target");
    }
    let system_prompt = build_system_prompt(&schema);

    let llm = LlmClient::with_timeout(
        config.llm_api_key.clone(),
        config.model.clone(),
        config.llm_base_url.clone(),
        config.llm_timeout(),
    )
    .context("Failed to initialise LLM client")?;
    let executor = QueryExecutor::with_timeout(config.database_url.clone(), config.statement_timeout());

    let service = Arc::new(NlqService::new(
        SqlGenerator::new(llm, system_prompt),
        SqlSanitizer::new(),
        executor,
    ));

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address()))?;

    server::serve(listener, service).await?;
    Ok(())
}
