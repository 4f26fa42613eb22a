use crate::error::{NlqError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const TEMPERATURE: f64 = 0.1;

/// A chat-style text completion backend.
#[async_trait]
pub trait TextCompletionService: Send + Sync {
    /// Return the primary completion for one system/user message pair.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

#[async_trait]
impl<T: TextCompletionService + ?Sized> TextCompletionService for Arc<T> {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        (**self).complete(system_prompt, user_prompt).await
    }
}

/// OpenAI-compatible chat completions client.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self> {
        Self::with_timeout(api_key, model, base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        api_key: String,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NlqError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(http, api_key, model, base_url))
    }

    /// Use a caller-built HTTP client (proxy, TLS or timeout settings).
    pub fn with_client(
        http: reqwest::Client,
        api_key: String,
        model: String,
        base_url: String,
    ) -> Self {
        Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    fn request_body(&self, system_prompt: &str, user_prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "temperature": TEMPERATURE,
        })
    }
}

#[async_trait]
impl TextCompletionService for LlmClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let body = self.request_body(system_prompt, user_prompt);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NlqError::Generation(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(%status, "LLM API returned an error status");
            return Err(NlqError::Generation(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| NlqError::Generation(format!("Failed to parse LLM response: {}", e)))?;

        extract_content(&response_json)
    }
}

/// Pull `choices[0].message.content` out of a chat completion response.
fn extract_content(response_json: &serde_json::Value) -> Result<String> {
    let content = response_json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| NlqError::Generation("No content in LLM response".to_string()))?
        .trim();

    if content.is_empty() {
        return Err(NlqError::Generation("Empty content in LLM response".to_string()));
    }
    Ok(content.to_string())
}

/// Remove a leading ```lang fence and a trailing ``` fence.
///
/// Only the ends of the text are touched; backticks inside the statement
/// survive.
pub fn strip_code_fences(text: &str) -> String {
    let mut sql = text.trim();
    if let Some(rest) = sql.strip_prefix("```") {
        sql = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()).trim();
    }
    if let Some(rest) = sql.strip_suffix("```") {
        sql = rest.trim();
    }
    sql.to_string()
}

/// Turns a question into raw (unsanitized) SQL text.
pub struct SqlGenerator<C> {
    completion: C,
    system_prompt: Arc<str>,
}

impl<C: TextCompletionService> SqlGenerator<C> {
    pub fn new(completion: C, system_prompt: impl Into<Arc<str>>) -> Self {
        Self {
            completion,
            system_prompt: system_prompt.into(),
        }
    }

    pub async fn generate(&self, question: &str) -> Result<String> {
        debug!(question, "Requesting SQL from LLM");
        let raw = self.completion.complete(&self.system_prompt, question).await?;
        let sql = strip_code_fences(&raw);
        info!(generated_sql = %sql, "Generated SQL");
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{read_request, HttpRequest, HttpResponse};
    use std::sync::Mutex;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// One-shot chat completions endpoint on loopback. Replies with `status`
    /// and `body`, and hands back the request it received.
    async fn fake_upstream(status: u16, body: String) -> (String, JoinHandle<HttpRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/openai/v1/", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await.unwrap().unwrap();
            stream
                .write_all(&HttpResponse::json(status, body).to_bytes())
                .await
                .unwrap();
            stream.shutdown().await.unwrap();
            request
        });
        (base_url, handle)
    }

    fn loopback_client(base_url: String) -> LlmClient {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        LlmClient::with_client(
            http,
            "gsk_test".to_string(),
            "llama-3.1-8b-instant".to_string(),
            base_url,
        )
    }

    struct Canned {
        reply: String,
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl TextCompletionService for Canned {
        async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
            self.seen
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), user_prompt.to_string()));
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn test_strip_sql_fence() {
        assert_eq!(strip_code_fences("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_code_fences("```SQL SELECT 1```"), "SELECT 1");
        assert_eq!(strip_code_fences("```\nSELECT 1\n```\n"), "SELECT 1");
        assert_eq!(strip_code_fences("  SELECT 1  "), "SELECT 1");
    }

    #[test]
    fn test_strip_keeps_interior_backticks() {
        assert_eq!(
            strip_code_fences("```postgresql\nSELECT '```' AS fence, `a` FROM t\n```"),
            "SELECT '```' AS fence, `a` FROM t"
        );
    }

    #[test]
    fn test_strip_without_closing_fence() {
        assert_eq!(strip_code_fences("```sql\nSELECT 2"), "SELECT 2");
    }

    #[test]
    fn test_extract_content() {
        let response = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "  SELECT 1\n"}}]
        });
        assert_eq!(extract_content(&response).unwrap(), "SELECT 1");
    }

    #[test]
    fn test_extract_content_missing() {
        let response = serde_json::json!({"choices": []});
        assert!(matches!(extract_content(&response), Err(NlqError::Generation(_))));

        let response = serde_json::json!({"choices": [{"message": {"content": "   "}}]});
        assert!(matches!(extract_content(&response), Err(NlqError::Generation(_))));
    }

    #[test]
    fn test_request_body() {
        let client = LlmClient::new(
            "key".to_string(),
            "llama-3.1-8b-instant".to_string(),
            "https://example.test/v1/".to_string(),
        )
        .unwrap();
        let body = client.request_body("sys", "how many invoices?");
        assert_eq!(body["model"], "llama-3.1-8b-instant");
        assert_eq!(body["temperature"], 0.1);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "sys");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "how many invoices?");
        assert_eq!(client.base_url, "https://example.test/v1");
    }

    #[tokio::test]
    async fn test_generator_passes_prompt_and_strips_fences() {
        let canned = Arc::new(Canned {
            reply: "```sql\nSELECT count(*) FROM invoices\n```".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let generator = SqlGenerator::new(canned.clone(), "system prompt");

        let sql = generator.generate("how many invoices?").await.unwrap();
        assert_eq!(sql, "SELECT count(*) FROM invoices");

        let seen = canned.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "system prompt");
        assert_eq!(seen[0].1, "how many invoices?");
    }

    #[tokio::test]
    async fn test_complete_returns_message_content() {
        let reply = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "```sql\nSELECT 1\n```"}}]
        });
        let (base_url, upstream) = fake_upstream(200, reply.to_string()).await;
        let client = loopback_client(base_url);

        let content = client.complete("sys", "how many invoices?").await.unwrap();
        assert_eq!(content, "```sql\nSELECT 1\n```");

        let request = upstream.await.unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/openai/v1/chat/completions");
        assert_eq!(request.headers["authorization"], "Bearer gsk_test");
        let sent: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(sent["model"], "llama-3.1-8b-instant");
        assert_eq!(sent["messages"][1]["content"], "how many invoices?");
    }

    #[tokio::test]
    async fn test_complete_maps_error_status_with_body() {
        let (base_url, upstream) =
            fake_upstream(503, r#"{"error":"model overloaded"}"#.to_string()).await;
        let client = loopback_client(base_url);

        let err = client.complete("sys", "how many invoices?").await.unwrap_err();
        match &err {
            NlqError::Generation(message) => {
                assert!(message.starts_with("LLM API error (503"), "{}", message);
                assert!(message.contains(r#"{"error":"model overloaded"}"#), "{}", message);
            }
            other => panic!("expected Generation, got {:?}", other),
        }
        assert_eq!(err.status_code(), 500);
        upstream.await.unwrap();
    }

    #[tokio::test]
    async fn test_complete_rejects_reply_without_content() {
        let (base_url, upstream) = fake_upstream(200, r#"{"choices":[]}"#.to_string()).await;
        let client = loopback_client(base_url);

        let err = client.complete("sys", "q").await.unwrap_err();
        assert!(matches!(err, NlqError::Generation(_)));
        upstream.await.unwrap();
    }
}
