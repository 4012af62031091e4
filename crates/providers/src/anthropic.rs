//! Anthropic native client implementation.
//!
//! Uses Anthropic's Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//!
//! One request, one reply. The conversation window arrives already trimmed;
//! this client owns the per-request timeout (there is none above it).

use std::time::Duration;

use async_trait::async_trait;
use deskhive_core::client::WorkerClient;
use deskhive_core::error::ClientError;
use deskhive_core::message::{ChatMessage, ChatRole};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Anthropic native Messages API client.
pub struct AnthropicClient {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    timeout: Duration,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Create a new Anthropic client with default endpoint and timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the reply length ceiling.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Extract system messages from the window.
    /// Anthropic puts the system prompt as a top-level field, not in messages.
    fn extract_system(messages: &[ChatMessage]) -> (Option<String>, Vec<&ChatMessage>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut non_system: Vec<&ChatMessage> = Vec::new();

        for msg in messages {
            match msg.role {
                ChatRole::System => system_parts.push(&msg.content),
                _ => non_system.push(msg),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, non_system)
    }

    /// Convert window messages to Anthropic API format.
    fn to_api_messages(messages: &[&ChatMessage]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|msg| ApiMessage {
                role: match msg.role {
                    ChatRole::Assistant => "assistant".into(),
                    // System never reaches here; anything else is user
                    _ => "user".into(),
                },
                content: msg.content.clone(),
            })
            .collect()
    }

    /// Map a non-success status to a client error.
    fn map_error_status(status: u16, retry_after: Option<u64>, body: String, model: &str) -> ClientError {
        match status {
            429 => ClientError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(5),
            },
            401 | 403 => ClientError::AuthenticationFailed("Invalid Anthropic API key".into()),
            404 => ClientError::ModelNotFound(model.to_string()),
            _ => ClientError::Api {
                status_code: status,
                message: body,
            },
        }
    }

    /// Join the text blocks of a response into the reply string.
    fn reply_text(resp: ApiResponse) -> String {
        let mut text = String::new();
        for block in resp.content {
            if let ResponseBlock::Text { text: t } = block {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&t);
            }
        }
        text
    }
}

#[async_trait]
impl WorkerClient for AnthropicClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_conversation(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> std::result::Result<String, ClientError> {
        let url = format!("{}/v1/messages", self.base_url);
        let (system, window) = Self::extract_system(messages);
        let api_messages = Self::to_api_messages(&window);

        let mut body = serde_json::json!({
            "model": model,
            "messages": api_messages,
            "max_tokens": self.max_tokens,
        });

        if let Some(ref sys) = system {
            body["system"] = serde_json::json!(sys);
        }

        debug!(client = "anthropic", model = %model, messages = window.len(), "Sending conversation");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::Timeout(e.to_string())
                } else {
                    ClientError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status != 200 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(Self::map_error_status(status, retry_after, error_body, model));
        }

        let api_resp: ApiResponse = response.json().await.map_err(|e| ClientError::Api {
            status_code: 200,
            message: format!("Failed to parse Anthropic response: {e}"),
        })?;

        debug!(id = %api_resp.id, model = %api_resp.model, "Reply received");

        Ok(Self::reply_text(api_resp))
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    id: String,
    model: String,
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    // Tool use and thinking blocks are not requested; tolerate and skip them
    #[serde(other)]
    Other,
}
