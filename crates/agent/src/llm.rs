use std::time::Duration;

use async_trait::async_trait;
use livequote_core::config::{LlmConfig, LlmProvider};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// One system + user exchange sent to the completion service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self { system: system.into(), user: user.into() }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm transport failed: {0}")]
    Transport(String),
    #[error("llm returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm response could not be decoded: {0}")]
    Decode(String),
    #[error("llm response contained no message content")]
    EmptyResponse,
}

impl LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::EmptyResponse => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Client for any OpenAI-compatible `/v1/chat/completions` endpoint
/// (OpenAI itself, or Ollama's compatibility layer).
pub struct HttpLlmClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl HttpLlmClient {
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            api_key: None,
            model: model.into(),
            temperature: 0.7,
            max_tokens: 1000,
            retry: RetryPolicy::default(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = match (&config.base_url, config.provider) {
            (Some(base_url), _) => base_url.as_str(),
            (None, LlmProvider::OpenAi) => OPENAI_BASE_URL,
            (None, LlmProvider::Ollama) => "http://localhost:11434",
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let mut client = Self::new(base_url, config.model.clone())?
            .with_sampling(config.temperature, config.max_tokens)
            .with_retry(RetryPolicy { max_retries: config.max_retries, ..RetryPolicy::default() });
        client.http = http;
        client.api_key = config.api_key.clone();
        Ok(client)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_once(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": [
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.user },
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "response_format": { "type": "json_object" },
        });

        let mut builder = self.http.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response =
            builder.send().await.map_err(|error| LlmError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let completion: ChatCompletion =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.send_once(request).await {
                Ok(content) => {
                    debug!(
                        event_name = "llm.completion.received",
                        model = %self.model,
                        attempt,
                        bytes = content.len(),
                        "completion received"
                    );
                    return Ok(content);
                }
                Err(error) if error.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        event_name = "llm.completion.retry",
                        model = %self.model,
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "completion failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{CompletionRequest, HttpLlmClient, LlmClient, LlmError, RetryPolicy};

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy { max_retries, base_delay_ms: 1, max_delay_ms: 2 }
    }

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        })
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("You are a consultant.", "Hi there")
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy { max_retries: 5, base_delay_ms: 250, max_delay_ms: 1_000 };
        assert_eq!(policy.backoff(0).as_millis(), 250);
        assert_eq!(policy.backoff(1).as_millis(), 500);
        assert_eq!(policy.backoff(4).as_millis(), 1_000);
    }

    #[tokio::test]
    async fn returns_first_choice_content_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("{\"ok\":true}")))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpLlmClient::new(&server.uri(), "gpt-4.1-mini")
            .expect("client")
            .with_api_key("sk-test");
        let content = client.complete(&request()).await.expect("completion");

        assert_eq!(content, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            HttpLlmClient::new(&server.uri(), "m").expect("client").with_retry(fast_retry(3));
        let error = client.complete(&request()).await.expect_err("401 must fail");

        assert!(matches!(error, LlmError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn server_errors_exhaust_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client =
            HttpLlmClient::new(&server.uri(), "m").expect("client").with_retry(fast_retry(2));
        let error = client.complete(&request()).await.expect_err("503 must fail");

        assert!(matches!(error, LlmError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn empty_choices_surface_as_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = HttpLlmClient::new(&server.uri(), "m").expect("client");
        let error = client.complete(&request()).await.expect_err("no content");

        assert!(matches!(error, LlmError::EmptyResponse));
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let client = HttpLlmClient::new("http://localhost:11434/", "llama3.1").expect("client");
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
    }
}
