//! Fakes for the completion and execution services.

#![allow(dead_code)]

use async_trait::async_trait;
use nlq_gateway::error::{NlqError, Result};
use nlq_gateway::execution::{QueryResult, Row, SqlExecutionService};
use nlq_gateway::llm::{SqlGenerator, TextCompletionService};
use nlq_gateway::security::{SanitizedSql, SqlSanitizer};
use nlq_gateway::NlqService;
use std::sync::{Arc, Mutex};

pub const SYSTEM_PROMPT: &str = "You are an expert Postgres SQL generator.";

/// Replies with a fixed completion, or a fixed error.
pub struct ScriptedCompletion {
    reply: std::result::Result<String, String>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TextCompletionService for ScriptedCompletion {
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.calls.lock().unwrap().push(user_prompt.to_string());
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(message) => Err(NlqError::Generation(message.clone())),
        }
    }
}

/// Records executed SQL and returns a canned result or database error.
pub struct RecordingExecutor {
    result: std::result::Result<QueryResult, String>,
    pub executed: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn returning(result: QueryResult) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(result),
            executed: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(message.to_string()),
            executed: Mutex::new(Vec::new()),
        })
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlExecutionService for RecordingExecutor {
    async fn execute(&self, sql: &SanitizedSql) -> Result<QueryResult> {
        self.executed.lock().unwrap().push(sql.as_str().to_string());
        match &self.result {
            Ok(result) => Ok(result.clone()),
            Err(message) => Err(NlqError::Execution(message.clone())),
        }
    }
}

pub fn vendor_totals() -> QueryResult {
    let rows = [("Acme", 1200.5), ("Globex", 310.0)]
        .iter()
        .map(|(vendor, total)| {
            let mut row = Row::new();
            row.insert("vendorId".to_string(), serde_json::json!(vendor));
            row.insert("total".to_string(), serde_json::json!(total));
            row
        })
        .collect();
    QueryResult::new(vec!["vendorId".to_string(), "total".to_string()], rows)
}

pub fn service(
    completion: Arc<ScriptedCompletion>,
    executor: Arc<RecordingExecutor>,
) -> NlqService<Arc<ScriptedCompletion>, Arc<RecordingExecutor>> {
    NlqService::new(
        SqlGenerator::new(completion, SYSTEM_PROMPT),
        SqlSanitizer::new(),
        executor,
    )
}
