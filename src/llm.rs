//! LLM client abstraction and OpenAI-compatible chat-completion implementation.
//!
//! This module provides a generic [`LlmClient`] trait for structured JSON
//! completions, along with concrete implementations:
//!
//! - [`OpenAiClient`]: production client for the OpenAI chat-completions API
//! - [`MockLlmClient`]: test double for unit tests
//!
//! Callers normally go through [`crate::gateway::Gateway`], which classifies
//! failures and decides between the model answer and a fallback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during LLM operations.
///
/// The `Display` text is what [`crate::gateway::FailureKind::classify`]
/// inspects, so API errors keep the HTTP status in their message.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// The OPENAI_API_KEY environment variable is not set.
    #[error("OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    /// HTTP or network error occurred.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The API answered with a non-success status.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Failed to parse the API response or the model output.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Model returned no text content.
    #[error("Model returned empty response")]
    EmptyResponse,
}

// ============================================================================
// Completion Type
// ============================================================================

/// The result of a successful LLM completion request.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The generated text from the model.
    pub text: String,
}

// ============================================================================
// LlmClient Trait
// ============================================================================

/// Generic interface for LLM clients.
///
/// One call sends a single user-role message and asks for a JSON-object
/// response. No retries, no streaming.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a JSON-mode completion for a prompt.
    ///
    /// # Arguments
    ///
    /// * `prompt` - The full prompt, sent as the only user message
    /// * `temperature` - Sampling temperature
    ///
    /// # Returns
    ///
    /// A [`Completion`] whose text should hold one JSON object.
    async fn complete_json(&self, prompt: &str, temperature: f32) -> Result<Completion, LlmError>;
}

// ============================================================================
// OpenAI API Implementation
// ============================================================================

/// Client for OpenAI-compatible chat-completion endpoints.
pub struct OpenAiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

/// Request body for the chat-completions endpoint.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    response_format: ResponseFormat,
    temperature: f32,
}

/// A message in the conversation.
#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Response from the chat-completions endpoint.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Error envelope returned by the API on non-success statuses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl OpenAiClient {
    /// Model used when `OPENAI_MODEL` is not set.
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    /// Endpoint root used when `OPENAI_BASE_URL` is not set.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    /// Create a new client by reading the API key from the environment.
    ///
    /// The key is cleaned with [`crate::sanitize_api_key`]; model and base URL
    /// overrides are read as in [`OpenAiClient::configured`].
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::MissingApiKey`] if no usable key is set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = crate::resolve_api_key().ok_or(LlmError::MissingApiKey)?;
        Ok(Self::configured(api_key))
    }

    /// Create a client with an explicit key, honouring the `OPENAI_MODEL` and
    /// `OPENAI_BASE_URL` environment overrides.
    pub fn configured(api_key: String) -> Self {
        let mut client = Self::new(api_key);
        if let Some(model) = non_empty_env("OPENAI_MODEL") {
            client = client.with_model(model);
        }
        if let Some(base_url) = non_empty_env("OPENAI_BASE_URL") {
            client = client.with_base_url(base_url);
        }
        client
    }

    /// Create a new client with an explicit API key and default settings.
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: Self::DEFAULT_MODEL.to_string(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Cheap credential check: list the available models.
    pub async fn check_key(&self) -> Result<(), LlmError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }
        Ok(())
    }

    fn build_request(&self, prompt: &str, temperature: f32) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete_json(&self, prompt: &str, temperature: f32) -> Result<Completion, LlmError> {
        let request_body = self.build_request(prompt, temperature);

        debug!(
            model = %self.model,
            prompt_len = prompt.len(),
            temperature,
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)?;

        Ok(Completion { text })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Pull `error.message` out of an API error body, or return the raw body.
fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.trim().to_string(),
    }
}

/// Parse model output into a JSON object, stripping markdown fences if present.
pub fn parse_json_object(text: &str) -> Result<Map<String, Value>, LlmError> {
    let cleaned = strip_markdown_fences(text);
    if cleaned.is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(LlmError::Parse(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(LlmError::Parse(format!("JSON parse error: {e}"))),
    }
}

/// Strip markdown code fences from LLM output.
pub fn strip_markdown_fences(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        let after_first_fence = trimmed
            .find('\n')
            .map(|i| &trimmed[i + 1..])
            .unwrap_or(trimmed);
        if let Some(end) = after_first_fence.rfind("```") {
            return after_first_fence[..end].trim().to_string();
        }
    }
    trimmed.to_string()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Mock Implementation (Test Only)
// ============================================================================

/// Mock LLM client for testing. Returns pre-programmed results in FIFO order
/// and records every prompt it receives.
#[cfg(test)]
pub struct MockLlmClient {
    /// Pre-programmed results to return in FIFO order.
    pub responses: std::sync::Mutex<std::collections::VecDeque<Result<String, LlmError>>>,
    /// Prompts received, in call order.
    pub prompts: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockLlmClient {
    /// Create a new mock client with a sequence of successful responses.
    ///
    /// # Panics
    ///
    /// [`complete_json`](LlmClient::complete_json) panics if called more
    /// times than there are responses.
    pub fn new(responses: Vec<String>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Create a mock client that may also return errors.
    pub fn with_results(results: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(results.into()),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create a mock client that fails `times` times with the same error.
    pub fn failing(error: LlmError, times: usize) -> Self {
        Self::with_results((0..times).map(|_| Err(error.clone())).collect())
    }

    /// Number of completions requested so far.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// The most recent prompt, if any.
    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete_json(
        &self,
        prompt: &str,
        _temperature: f32,
    ) -> Result<Completion, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockLlmClient: no more responses available");

        next.map(|text| Completion { text })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_missing_key() {
        // SAFETY: This test runs serially and no other thread reads OPENAI_API_KEY concurrently.
        unsafe { std::env::remove_var("OPENAI_API_KEY") };

        let result = OpenAiClient::from_env();
        assert!(matches!(result, Err(LlmError::MissingApiKey)));
    }

    #[test]
    fn test_request_uses_json_object_mode() {
        let client = OpenAiClient::new("sk-test".to_string());
        let request = client.build_request("Recommend something", 0.5);
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Recommend something");
        assert!((body["temperature"].as_f64().unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_model_defaults_and_override() {
        let client = OpenAiClient::new("sk-test".into());
        assert_eq!(client.model(), OpenAiClient::DEFAULT_MODEL);
        assert_eq!(client.with_model("gpt-4o").model(), "gpt-4o");
    }

    #[test]
    fn test_with_base_url_trims_trailing_slash() {
        let client = OpenAiClient::new("sk-test".into()).with_base_url("http://localhost:8080/v1/");
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_api_error_status_in_display() {
        let err = LlmError::Api {
            status: 401,
            message: api_error_message(
                r#"{"error": {"message": "Incorrect API key provided: sk-xx", "type": "invalid_request_error"}}"#,
            ),
        };
        let text = err.to_string();
        assert!(text.contains("401"));
        assert!(text.contains("Incorrect API key provided"));
    }

    #[test]
    fn test_api_error_message_raw_body() {
        assert_eq!(api_error_message("  upstream timeout \n"), "upstream timeout");
    }

    #[test]
    fn test_parse_json_object() {
        let map = parse_json_object(r#"{"answer": "yes", "relevant_movies": [1, 2]}"#).unwrap();
        assert_eq!(map["answer"], "yes");
    }

    #[test]
    fn test_parse_json_object_strips_fences() {
        let map = parse_json_object("```json\n{\"predicted_rating\": 8.1}\n```").unwrap();
        assert_eq!(map["predicted_rating"], 8.1);
    }

    #[test]
    fn test_parse_json_object_rejects_array() {
        let err = parse_json_object("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_parse_json_object_rejects_garbage() {
        assert!(matches!(
            parse_json_object("not json at all"),
            Err(LlmError::Parse(_))
        ));
        assert!(matches!(parse_json_object("   "), Err(LlmError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_mock_returns_responses_in_order() {
        let mock = MockLlmClient::new(vec!["first".to_string(), "second".to_string()]);

        let completion1 = mock.complete_json("p1", 0.3).await.unwrap();
        assert_eq!(completion1.text, "first");

        let completion2 = mock.complete_json("p2", 0.3).await.unwrap();
        assert_eq!(completion2.text, "second");

        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.last_prompt().as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn test_mock_returns_errors() {
        let mock = MockLlmClient::failing(LlmError::Http("connection reset".into()), 2);

        assert!(mock.complete_json("a", 0.1).await.is_err());
        assert!(mock.complete_json("b", 0.1).await.is_err());
        assert_eq!(mock.call_count(), 2);
    }
}
