//! HTTP surface.
//!
//! Minimal HTTP/1.1 handling on top of tokio: one request per connection,
//! JSON in and out, permissive CORS.

use crate::error::{NlqError, Result};
use crate::execution::SqlExecutionService;
use crate::llm::TextCompletionService;
use crate::nlq::{NlqRequest, NlqService};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Largest request body accepted.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;
const MAX_HEADER_BYTES: usize = 16 * 1024;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn json(status: u16, body: String) -> Self {
        Self { status, body }
    }

    pub fn error(status: u16, detail: &str) -> Self {
        Self::json(status, serde_json::json!({ "detail": detail }).to_string())
    }

    pub fn from_error(err: &NlqError) -> Self {
        Self::error(err.status_code(), &err.to_string())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\n\
             Access-Control-Allow-Origin: *\r\n\
             Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
             Access-Control-Allow-Headers: *\r\n\
             Connection: close\r\n\
             Content-Length: {}\r\n",
            self.status,
            reason_phrase(self.status),
            self.body.len()
        );
        if !self.body.is_empty() {
            head.push_str("Content-Type: application/json\r\n");
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(self.body.as_bytes());
        bytes
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Failure to read a request off the wire, already shaped as a response.
#[derive(Debug)]
pub struct ReadError(pub HttpResponse);

impl From<std::io::Error> for ReadError {
    fn from(e: std::io::Error) -> Self {
        ReadError(HttpResponse::error(400, &format!("Failed to read request: {}", e)))
    }
}

/// Read one request. `Ok(None)` means the peer closed before sending anything.
pub async fn read_request<R>(stream: &mut R) -> std::result::Result<Option<HttpRequest>, ReadError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = find_subsequence(&buffer, b"\r\n\r\n") {
            break pos;
        }
        if buffer.len() > MAX_HEADER_BYTES {
            return Err(ReadError(HttpResponse::error(431, "Request headers too large")));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            if buffer.is_empty() {
                return Ok(None);
            }
            return Err(ReadError(HttpResponse::error(400, "Incomplete request")));
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(ReadError(HttpResponse::error(400, "Malformed request line")));
    }
    let method = parts[0].to_uppercase();
    let path = normalize_path(parts[1]);

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(v) => v
            .parse::<usize>()
            .map_err(|_| ReadError(HttpResponse::error(400, "Invalid Content-Length")))?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(ReadError(HttpResponse::error(413, "Request body too large")));
    }

    let mut body = buffer[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(ReadError(HttpResponse::error(400, "Incomplete request body")));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(Some(HttpRequest {
        method,
        path,
        headers,
        body,
    }))
}

/// Drop the query string and any trailing slash (root stays `/`).
fn normalize_path(raw: &str) -> String {
    let path = raw.split('?').next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Dispatch a parsed request.
pub async fn route<C, E>(service: &NlqService<C, E>, request: &HttpRequest) -> HttpResponse
where
    C: TextCompletionService,
    E: SqlExecutionService,
{
    match (request.method.as_str(), request.path.as_str()) {
        ("OPTIONS", _) => HttpResponse::json(204, String::new()),
        ("GET", "/health") => HttpResponse::json(200, r#"{"status":"ok"}"#.to_string()),
        ("POST", "/nlq") => match handle_nlq(service, &request.body).await {
            Ok(body) => HttpResponse::json(200, body),
            Err(e) => HttpResponse::from_error(&e),
        },
        (_, "/nlq") | (_, "/health") => HttpResponse::error(405, "Method Not Allowed"),
        _ => HttpResponse::error(404, "Not Found"),
    }
}

async fn handle_nlq<C, E>(service: &NlqService<C, E>, body: &[u8]) -> Result<String>
where
    C: TextCompletionService,
    E: SqlExecutionService,
{
    let request: NlqRequest = serde_json::from_slice(body)
        .map_err(|e| NlqError::BadRequest(format!("Invalid request body: {}", e)))?;
    let response = service.handle(&request.question).await?;
    Ok(serde_json::to_string(&response)?)
}

async fn handle_connection<S, C, E>(mut stream: S, service: Arc<NlqService<C, E>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: TextCompletionService,
    E: SqlExecutionService,
{
    let response = match read_request(&mut stream).await {
        Ok(Some(request)) => {
            debug!(method = %request.method, path = %request.path, "Request");
            let response = route(&service, &request).await;
            if response.status >= 500 {
                error!(status = response.status, body = %response.body, "Request failed");
            } else if response.status >= 400 {
                warn!(status = response.status, body = %response.body, "Request rejected");
            }
            response
        }
        Ok(None) => return,
        Err(ReadError(response)) => response,
    };

    if let Err(e) = stream.write_all(&response.to_bytes()).await {
        warn!(error = %e, "Failed to write response");
        return;
    }
    let _ = stream.shutdown().await;
}

/// Pause before the next accept. Errors tied to a single peer retry at once;
/// anything else (descriptor exhaustion, mostly) waits so the loop does not spin.
fn accept_backoff(err: &std::io::Error) -> Option<Duration> {
    match err.kind() {
        ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset | ErrorKind::Interrupted => None,
        _ => Some(ACCEPT_BACKOFF),
    }
}

/// Accept connections forever, one task per connection. Accept failures are
/// logged and never end the loop.
pub async fn serve<C, E>(listener: TcpListener, service: Arc<NlqService<C, E>>) -> Result<()>
where
    C: TextCompletionService + 'static,
    E: SqlExecutionService + 'static,
{
    info!(address = %listener.local_addr()?, "Listening");
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                if let Some(pause) = accept_backoff(&e) {
                    tokio::time::sleep(pause).await;
                }
                continue;
            }
        };
        let service = Arc::clone(&service);
        let span = tracing::info_span!("nlq", request_id = %Uuid::new_v4(), peer = %addr);
        tokio::spawn(handle_connection(stream, service).instrument(span));
    }
}
