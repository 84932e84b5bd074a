//! Remote model service client.
//!
//! The model service turns a natural-language instruction into a snippet. The wire contract is
//! one JSON request to `POST {base}/ai-command`:
//!
//! ```text
//! { "context": "name | age\nBob | 30", "instruction": "drop empty ages", "api_provider": "openai" }
//! ```
//!
//! answered by `{"status": "success", "code": "..."}` or `{"status": "error", "message": "..."}`.
//! Any transport failure or non-success HTTP status is a [`TransformFailure::NetworkError`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{CONTEXT_ROWS, DEFAULT_PROVIDER, MODEL_REQUEST_TIMEOUT, MODEL_SERVICE_URL};
use crate::dataset::Dataset;
use crate::error::TransformFailure;

/// Replies the model uses instead of code.
const SENTINELS: [&str; 2] = ["Can you elaborate?", "This operation is not possible"];

static TABLE_CODE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"df\s*[\.\[]|pd\.").ok());

/// Body of `POST /ai-command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub instruction: String,
    #[serde(default = "default_provider")]
    pub api_provider: String,
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

/// Reply of `POST /ai-command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ModelResponse {
    Success {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_used: Option<String>,
    },
    Error {
        message: String,
    },
}

/// What the model suggested for an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suggestion {
    /// Code that operates on the table and can be applied.
    Snippet(String),
    /// Anything else: a clarification request, a refusal or a commented error.
    Message(String),
}

impl Suggestion {
    /// Classify a raw model reply.
    pub fn classify(reply: &str) -> Self {
        let reply = reply.trim();
        if is_executable_code(reply) {
            Suggestion::Snippet(reply.to_string())
        } else {
            Suggestion::Message(reply.to_string())
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Suggestion::Snippet(s) | Suggestion::Message(s) => s,
        }
    }
}

/// Whether a model reply is table code rather than conversation.
pub fn is_executable_code(code: &str) -> bool {
    let code = code.trim();
    if code.is_empty() || code.starts_with('#') {
        return false;
    }
    if SENTINELS.iter().any(|s| code.contains(s)) {
        return false;
    }
    TABLE_CODE.as_ref().is_some_and(|re| re.is_match(code))
}

/// Prompt context for a dataset: the header line, then up to `rows` sample rows, all
/// ` | `-delimited. Empty datasets give an empty context.
pub fn build_context(dataset: &Dataset, rows: usize) -> String {
    if dataset.is_empty() {
        return String::new();
    }
    let header = dataset.columns().join(" | ");
    let sample = dataset
        .rows()
        .iter()
        .take(rows)
        .map(|row| {
            row.values()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}\n{}", header, sample)
}

/// HTTP client for the model service.
#[derive(Debug, Clone)]
pub struct ModelServiceClient {
    base_url: String,
    provider: String,
    context_rows: usize,
    client: reqwest::Client,
}

impl Default for ModelServiceClient {
    fn default() -> Self {
        Self::new(MODEL_SERVICE_URL)
    }
}

impl ModelServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(MODEL_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Falling back to a default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            provider: DEFAULT_PROVIDER.to_string(),
            context_rows: CONTEXT_ROWS,
            client,
        }
    }

    /// Set the provider name sent as `api_provider`.
    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = provider.to_string();
        self
    }

    /// Set how many sample rows go into the context.
    pub fn with_context_rows(mut self, rows: usize) -> Self {
        self.context_rows = rows;
        self
    }

    /// Replace the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if let Ok(client) = reqwest::Client::builder().timeout(timeout).build() {
            self.client = client;
        }
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn context_rows(&self) -> usize {
        self.context_rows
    }

    /// The request this client would send for `instruction` against `dataset`.
    pub fn request_for(&self, dataset: &Dataset, instruction: &str) -> ModelRequest {
        ModelRequest {
            context: build_context(dataset, self.context_rows),
            instruction: instruction.to_string(),
            api_provider: self.provider.clone(),
        }
    }

    /// Ask the service for a snippet and classify the reply.
    pub async fn suggest(&self, dataset: &Dataset, instruction: &str) -> Result<Suggestion, TransformFailure> {
        let request = self.request_for(dataset, instruction);
        match self.send(&request).await? {
            ModelResponse::Success { code, api_used } => {
                log::info!(
                    "Model service answered via {}",
                    api_used.as_deref().unwrap_or(&self.provider)
                );
                Ok(Suggestion::classify(&code))
            }
            ModelResponse::Error { message } => Ok(Suggestion::Message(message)),
        }
    }

    /// Send one raw request.
    pub async fn send(&self, request: &ModelRequest) -> Result<ModelResponse, TransformFailure> {
        let url = format!("{}/ai-command", self.base_url);
        log::debug!("POST {} ({} chars of context)", url, request.context.len());

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| TransformFailure::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransformFailure::NetworkError(e.to_string()))?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<ModelResponse>(&body) {
                Ok(ModelResponse::Error { message }) => message,
                _ => body,
            };
            log::warn!("Model service returned HTTP {}: {}", status, detail);
            return Err(TransformFailure::NetworkError(format!("HTTP {}: {}", status, detail)));
        }

        serde_json::from_str(&body).map_err(|e| {
            TransformFailure::NetworkError(format!("invalid response from model service: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Cell, Row};
    use crate::error::ErrorKind;

    fn people() -> Dataset {
        Dataset::from_rows(
            [("Bob", "30"), ("Amy", ""), ("Cid", "25"), ("Dee", "41")]
                .iter()
                .map(|(n, a)| Row::from_iter([("name", Cell::from(*n)), ("age", Cell::from(*a))]))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_is_executable_code() {
        assert!(is_executable_code("df = df.dropna()"));
        assert!(is_executable_code("df['x'] = pd.to_numeric(df['x'])"));
        assert!(is_executable_code("df = df [df['a'] > 1]"));
        assert!(!is_executable_code(""));
        assert!(!is_executable_code("# Unsupported API provider: foo"));
        assert!(!is_executable_code("Can you elaborate?"));
        assert!(!is_executable_code("This operation is not possible"));
        assert!(!is_executable_code("x = 1"));
    }

    #[test]
    fn test_build_context() {
        let context = build_context(&people(), 3);
        assert_eq!(context, "name | age\nBob | 30\nAmy | \nCid | 25");
        assert_eq!(build_context(&Dataset::new(), 3), "");
    }

    #[test]
    fn test_response_wire_format() {
        let ok: ModelResponse =
            serde_json::from_str(r#"{"status":"success","code":"df = df.head()","api_used":"groq"}"#).unwrap();
        assert_eq!(
            ok,
            ModelResponse::Success {
                code: "df = df.head()".into(),
                api_used: Some("groq".into())
            }
        );
        let err: ModelResponse = serde_json::from_str(r#"{"status":"error","message":"boom"}"#).unwrap();
        assert_eq!(err, ModelResponse::Error { message: "boom".into() });

        let request: ModelRequest = serde_json::from_str(r#"{"context":"","instruction":"x"}"#).unwrap();
        assert_eq!(request.api_provider, "openai");
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            Suggestion::classify("  df = df.dropna()\n"),
            Suggestion::Snippet("df = df.dropna()".into())
        );
        assert!(matches!(
            Suggestion::classify("Can you elaborate?"),
            Suggestion::Message(_)
        ));
    }

    #[test]
    fn test_request_for_uses_provider_and_rows() {
        let client = ModelServiceClient::new("http://localhost:5000/")
            .with_provider("gemini")
            .with_context_rows(1);
        assert_eq!(client.base_url(), "http://localhost:5000");
        let request = client.request_for(&people(), "uppercase names");
        assert_eq!(request.api_provider, "gemini");
        assert_eq!(request.context, "name | age\nBob | 30");
    }

    /// Answer one request on a local port with a canned HTTP response.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            while !request_complete(&request) {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(head_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..head_end]
            .lines()
            .find_map(|line| {
                let (key, value) = line.split_once(':')?;
                if key.eq_ignore_ascii_case("content-length") {
                    value.trim().parse::<usize>().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0);
        request.len() >= head_end + 4 + length
    }

    fn client(base_url: String) -> ModelServiceClient {
        ModelServiceClient::new(base_url).with_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_error_status_is_network_error() {
        let url = serve_once("500 Internal Server Error", r#"{"status":"error","message":"boom"}"#).await;
        let err = client(url).suggest(&people(), "drop empty ages").await.unwrap_err();
        match err {
            TransformFailure::NetworkError(message) => {
                assert!(message.contains("HTTP 500"), "{}", message);
                assert!(message.contains("boom"), "{}", message);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_network_error() {
        let url = serve_once("200 OK", "<html>not json</html>").await;
        let err = client(url).suggest(&people(), "drop empty ages").await.unwrap_err();
        match err {
            TransformFailure::NetworkError(message) => {
                assert!(message.starts_with("invalid response from model service"), "{}", message)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_successful_reply_is_classified() {
        let url = serve_once(
            "200 OK",
            r#"{"status":"success","code":"df = df.dropna()","api_used":"groq"}"#,
        )
        .await;
        let suggestion = client(url).suggest(&people(), "drop empty ages").await.unwrap();
        assert_eq!(suggestion, Suggestion::Snippet("df = df.dropna()".into()));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_network_error() {
        let client = ModelServiceClient::new("http://127.0.0.1:9").with_timeout(Duration::from_secs(2));
        let err = client.suggest(&people(), "drop empty ages").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkError);
    }
}
