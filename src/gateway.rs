//! LLM gateway: one structured request per call, with failure classification.
//!
//! Every LLM-backed operation goes through [`Gateway::request`]. A gateway
//! built without a credential is inert and never touches the network. When a
//! call fails the error is classified by [`FailureKind::classify`]:
//!
//! - invalid credential: silent, the caller falls back without a notice
//! - quota / rate limit: one user-visible notice
//! - anything else: one notice with the diagnostic cut to 80 characters
//!
//! The classification matches on error text ("401", "incorrect api key",
//! "429", "quota"). It is brittle if the provider changes its error wording.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::llm::{LlmClient, LlmError, OpenAiClient, parse_json_object};

/// A parsed JSON object returned by the model.
pub type JsonObject = Map<String, Value>;

/// Maximum number of characters of an unexpected error shown to the user.
pub const NOTICE_DETAIL_LIMIT: usize = 80;

/// Notice shown once per quota / rate-limit failure.
pub const QUOTA_NOTICE: &str = "OpenAI quota exceeded. Using fallback mode.";

// ============================================================================
// Failure Classification
// ============================================================================

/// How a failed LLM call is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Unauthorized or invalid key. Reported silently.
    InvalidCredential,
    /// Quota exhausted or rate limited.
    QuotaExceeded,
    /// Network, malformed output, or anything unrecognised.
    Other,
}

impl FailureKind {
    /// Classify an error by its message text.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if message.contains("401") || lower.contains("incorrect api key") {
            Self::InvalidCredential
        } else if message.contains("429") || lower.contains("quota") {
            Self::QuotaExceeded
        } else {
            Self::Other
        }
    }

    /// The user-visible notice for this failure, if any.
    pub fn notice(self, message: &str) -> Option<String> {
        match self {
            Self::InvalidCredential => None,
            Self::QuotaExceeded => Some(QUOTA_NOTICE.to_string()),
            Self::Other => Some(format!(
                "LLM error: {}",
                truncate_chars(message, NOTICE_DETAIL_LIMIT)
            )),
        }
    }
}

/// Keep at most `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ============================================================================
// Key Validation
// ============================================================================

/// Maximum number of characters of a key-check diagnostic.
pub const KEY_CHECK_DETAIL_LIMIT: usize = 100;

/// Outcome of the startup credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCheck {
    Valid,
    /// The provider rejected the key.
    Invalid,
    /// The check itself failed; carries a truncated diagnostic.
    Unverified(String),
}

impl KeyCheck {
    pub fn from_result(result: Result<(), LlmError>) -> Self {
        match result {
            Ok(()) => Self::Valid,
            Err(err) => {
                let message = err.to_string();
                if message.contains("401") || message.to_lowercase().contains("incorrect") {
                    Self::Invalid
                } else {
                    Self::Unverified(truncate_chars(&message, KEY_CHECK_DETAIL_LIMIT).to_string())
                }
            }
        }
    }
}

/// List the provider's models once to see whether `client`'s key is accepted.
pub async fn check_api_key(client: &OpenAiClient) -> KeyCheck {
    KeyCheck::from_result(client.check_key().await)
}

// ============================================================================
// Notices
// ============================================================================

/// Sink for user-visible notices about degraded LLM calls.
///
/// Kept apart from `tracing` so that the silent/noisy contract holds no
/// matter how the log filter is configured.
pub trait Notices: Send + Sync {
    fn notice(&self, message: &str);
}

/// Prints notices to stderr.
pub struct ConsoleNotices;

impl Notices for ConsoleNotices {
    fn notice(&self, message: &str) {
        eprintln!("{message}");
    }
}

/// Records notices in memory for assertions.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotices {
    pub messages: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingNotices {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Notices for RecordingNotices {
    fn notice(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// Wraps an optional LLM client. `None` means no credential was supplied.
#[derive(Clone)]
pub struct Gateway {
    client: Option<Arc<dyn LlmClient>>,
    notices: Arc<dyn Notices>,
}

impl Gateway {
    pub fn new(client: Option<Arc<dyn LlmClient>>, notices: Arc<dyn Notices>) -> Self {
        Self { client, notices }
    }

    /// A gateway with no client. Every call returns without I/O.
    pub fn inert() -> Self {
        Self::new(None, Arc::new(ConsoleNotices))
    }

    /// Build a gateway from an optional key. A missing or blank key gives an
    /// inert gateway.
    pub fn from_api_key(api_key: Option<&str>) -> Self {
        match api_key.and_then(crate::sanitize_api_key) {
            Some(key) => {
                let client: Arc<dyn LlmClient> = Arc::new(OpenAiClient::configured(key));
                Self::new(Some(client), Arc::new(ConsoleNotices))
            }
            None => Self::inert(),
        }
    }

    /// Whether a client is present.
    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Send one prompt and parse the reply as a JSON object.
    ///
    /// Returns `None` when the gateway is inert or the call failed; failures
    /// are reported per [`FailureKind`] before returning.
    pub async fn request(&self, prompt: &str, temperature: f32) -> Option<JsonObject> {
        let client = self.client.as_ref()?;

        let result = client
            .complete_json(prompt, temperature)
            .await
            .and_then(|completion| parse_json_object(&completion.text));

        match result {
            Ok(object) => Some(object),
            Err(err) => {
                self.report(&err);
                None
            }
        }
    }

    /// Like [`Gateway::request`], with failures collapsed to an empty object.
    pub async fn call(&self, prompt: &str, temperature: f32) -> JsonObject {
        self.request(prompt, temperature).await.unwrap_or_default()
    }

    fn report(&self, err: &LlmError) {
        let message = err.to_string();
        let kind = FailureKind::classify(&message);
        debug!(?kind, "LLM call failed, using fallback");
        if let Some(notice) = kind.notice(&message) {
            self.notices.notice(&notice);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
