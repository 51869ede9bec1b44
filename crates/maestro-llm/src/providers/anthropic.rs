//! Anthropic Messages API adapter.
//!
//! The Messages API takes system text as a top-level field rather than a
//! conversation turn, requires `max_tokens` on every call, and answers with
//! a list of typed content blocks. Text blocks concatenate into the reply
//! content; `tool_use` blocks surface as tool calls.

use crate::completion::{CompletionRequest, CompletionResponse, Message, MessageRole, TokenUsage, ToolCall};
use crate::error::{Error, Result};
use crate::provider::LlmProvider;
use crate::util::{mask_api_key, sanitize_api_error, validate_api_key};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// Version header sent on every call.
pub const API_VERSION: &str = "2023-06-01";

/// Default API base.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Models this adapter advertises.
pub const MODELS: &[&str] = &[
    "claude-sonnet-4-5",
    "claude-haiku-4-5",
    "claude-opus-4-1",
    "claude-3-5-sonnet-20241022",
    "claude-3-5-haiku-20241022",
];

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Configuration for the Messages API adapter.
#[derive(Clone)]
pub struct AnthropicConfig {
    /// Key sent in the `x-api-key` header.
    pub api_key: String,
    /// API base.
    pub base_url: String,
    /// Model used when a request leaves `model` empty.
    pub default_model: String,
    /// `max_tokens` used when a request does not set one.
    pub default_max_tokens: u32,
    /// Per-call HTTP timeout.
    pub timeout: Duration,
}

// SECURITY: Debug must never print the whole key
impl fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AnthropicConfig {
    /// Configuration with defaults for everything but the key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            default_max_tokens: 4096,
            timeout: Duration::from_secs(60),
        }
    }

    /// Reads `ANTHROPIC_API_KEY`, `ANTHROPIC_BASE_URL` and `ANTHROPIC_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| Error::NotConfigured("ANTHROPIC_API_KEY not set".to_string()))?;
        if let Some(reason) = validate_api_key(&api_key, "Anthropic") {
            return Err(Error::NotConfigured(reason));
        }

        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("ANTHROPIC_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(model) = std::env::var("ANTHROPIC_MODEL") {
            config.default_model = model;
        }
        Ok(config)
    }

    /// Points the adapter at a different base.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Overrides the default model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Overrides the fallback `max_tokens`.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }

    /// Overrides the HTTP timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct MessagesPayload {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct WireTurn {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesReply {
    model: String,
    content: Vec<ReplyBlock>,
    stop_reason: Option<String>,
    usage: WireUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplyBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct FailureEnvelope {
    error: FailureBody,
}

#[derive(Deserialize)]
struct FailureBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

/// Splits the conversation into top-level system text and spoken turns.
///
/// Multiple system turns concatenate with a blank line between them; user
/// and assistant turns keep their order.
fn split_system(messages: &[Message]) -> (Option<String>, Vec<WireTurn>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut turns = Vec::new();

    for message in messages {
        match message.role {
            MessageRole::System => system_parts.push(&message.content),
            MessageRole::User => turns.push(WireTurn {
                role: "user",
                content: message.content.clone(),
            }),
            MessageRole::Assistant => turns.push(WireTurn {
                role: "assistant",
                content: message.content.clone(),
            }),
        }
    }

    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
    (system, turns)
}

/// Messages API backend.
pub struct AnthropicProvider {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicProvider {
    /// Builds the adapter and its HTTP client.
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Builds the adapter from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(AnthropicConfig::from_env()?)
    }

    async fn post_messages(&self, payload: &MessagesPayload) -> Result<MessagesReply> {
        let url = format!("{}/v1/messages", self.config.base_url);
        debug!(%url, "posting messages request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Network(sanitize_api_error(&e.to_string())))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(Error::RateLimit);
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<FailureEnvelope>(&body) {
                Ok(failure) => format!("{}: {}", failure.error.kind, failure.error.message),
                Err(_) => format!("HTTP {status}: {body}"),
            };
            return Err(Error::Api(sanitize_api_error(&detail)));
        }

        serde_json::from_str(&body).map_err(|e| Error::InvalidResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn available_models(&self) -> Vec<String> {
        MODELS.iter().map(|s| (*s).to_string()).collect()
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = if request.model.is_empty() {
            self.config.default_model.clone()
        } else {
            request.model.clone()
        };

        let (system, messages) = split_system(&request.messages);
        let payload = MessagesPayload {
            model,
            max_tokens: request.max_tokens.unwrap_or(self.config.default_max_tokens),
            system,
            messages,
            temperature: request.temperature,
        };

        let reply = self.post_messages(&payload).await?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in reply.content {
            match block {
                ReplyBlock::Text { text } => content.push_str(&text),
                ReplyBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: serde_json::to_string(&input)
                        .unwrap_or_else(|_| "{}".to_string()),
                }),
            }
        }

        let usage = TokenUsage {
            prompt_tokens: reply.usage.input_tokens,
            completion_tokens: reply.usage.output_tokens,
            total_tokens: reply.usage.input_tokens + reply.usage.output_tokens,
        };

        Ok(CompletionResponse {
            content,
            usage,
            tool_calls,
            finish_reason: reply.stop_reason,
            model: reply.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_overrides() {
        let config = AnthropicConfig::new("a-key-long-enough")
            .with_base_url("http://localhost:9999")
            .with_model("claude-haiku-4-5")
            .with_max_tokens(1024)
            .with_timeout(Duration::from_secs(15));

        assert_eq!(config.base_url, "http://localhost:9999");
        assert_eq!(config.default_model, "claude-haiku-4-5");
        assert_eq!(config.default_max_tokens, 1024);
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(AnthropicConfig::new("k").base_url, DEFAULT_BASE_URL);
        assert_eq!(AnthropicConfig::new("k").default_max_tokens, 4096);
    }

    #[test]
    fn test_debug_hides_the_key_body() {
        let rendered = format!("{:?}", AnthropicConfig::new("sk-ant-1234567890abcdef"));
        assert!(!rendered.contains("1234567890"));
        assert!(rendered.contains("..."));
    }

    #[test]
    fn test_system_turns_lift_out_and_join() {
        let (system, turns) = split_system(&[
            Message::system("first rule"),
            Message::user("question"),
            Message::system("second rule"),
            Message::assistant("answer"),
        ]);

        assert_eq!(system.as_deref(), Some("first rule\n\nsecond rule"));
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, "user");
        assert_eq!(turns[1].role, "assistant");
    }

    #[test]
    fn test_no_system_turns_means_no_system_field() {
        let (system, turns) = split_system(&[Message::user("hi")]);
        assert!(system.is_none());
        assert_eq!(turns.len(), 1);
    }

    #[test]
    fn test_reply_blocks_deserialize_by_type() {
        let body = r#"{
            "model": "claude-sonnet-4-5",
            "content": [
                {"type": "text", "text": "thinking done. "},
                {"type": "tool_use", "id": "t1", "name": "search", "input": {"q": "rust"}},
                {"type": "text", "text": "calling a tool."}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 7}
        }"#;

        let reply: MessagesReply = serde_json::from_str(body).unwrap();
        assert_eq!(reply.content.len(), 3);
        assert!(matches!(reply.content[1], ReplyBlock::ToolUse { .. }));
        assert_eq!(reply.usage.input_tokens, 12);
        assert_eq!(reply.stop_reason.as_deref(), Some("tool_use"));
    }

    #[test]
    fn test_failure_envelope_parses() {
        let body = r#"{"error": {"type": "invalid_request_error", "message": "max_tokens required"}}"#;
        let failure: FailureEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(failure.error.kind, "invalid_request_error");
        assert!(failure.error.message.contains("max_tokens"));
    }
}
