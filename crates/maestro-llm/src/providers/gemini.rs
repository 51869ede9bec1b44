//! Gemini generateContent adapter.
//!
//! Gemini diverges from the shared conversation shape in three ways: there
//! is no system role (system turns move to the top-level `systemInstruction`
//! field), the assistant role is spelled "model", and the API key rides in
//! the URL as a query parameter. The last point is why every error body is
//! scrubbed before it can surface.

use crate::completion::{CompletionRequest, CompletionResponse, Message, MessageRole, TokenUsage};
use crate::error::{Error, Result};
use crate::provider::LlmProvider;
use crate::util::{mask_api_key, sanitize_api_error, validate_api_key};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// Default API base.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Models this adapter advertises.
pub const MODELS: &[&str] = &["gemini-2.0-flash", "gemini-1.5-pro", "gemini-1.5-flash"];

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Configuration for the Gemini adapter.
#[derive(Clone)]
pub struct GeminiConfig {
    /// Key appended to every request URL.
    pub api_key: String,
    /// API base.
    pub base_url: String,
    /// Model used when a request leaves `model` empty.
    pub default_model: String,
    /// Per-call HTTP timeout.
    pub timeout: Duration,
}

// SECURITY: Debug must never print the whole key
impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GeminiConfig {
    /// Configuration with defaults for everything but the key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: GEMINI_API_BASE.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Reads `GEMINI_API_KEY` and `GEMINI_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| Error::NotConfigured("GEMINI_API_KEY not set".to_string()))?;
        if let Some(reason) = validate_api_key(&api_key, "Gemini") {
            return Err(Error::NotConfigured(reason));
        }

        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            config.default_model = model;
        }
        Ok(config)
    }

    /// Overrides the default model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
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
#[serde(rename_all = "camelCase")]
struct GeneratePayload {
    contents: Vec<Turn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Turn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<Tuning>,
}

#[derive(Serialize, Deserialize)]
struct Turn {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<TextPart>,
}

impl Turn {
    fn spoken(role: &str, text: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![TextPart {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TextPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Tuning {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateReply {
    candidates: Vec<ReplyCandidate>,
    #[serde(default)]
    usage_metadata: Option<TokenCounts>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyCandidate {
    content: Turn,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenCounts {
    prompt_token_count: u32,
    /// Absent when the reply is empty.
    #[serde(default)]
    candidates_token_count: Option<u32>,
    total_token_count: u32,
}

/// Splits the conversation into a system instruction and spoken turns.
fn wire_turns(messages: &[Message]) -> (Option<Turn>, Vec<Turn>) {
    let mut instruction_parts = Vec::new();
    let mut turns = Vec::new();

    for message in messages {
        match message.role {
            MessageRole::System => instruction_parts.push(TextPart {
                text: Some(message.content.clone()),
            }),
            MessageRole::User => turns.push(Turn::spoken("user", &message.content)),
            // Gemini spells the assistant role "model"
            MessageRole::Assistant => turns.push(Turn::spoken("model", &message.content)),
        }
    }

    let instruction = (!instruction_parts.is_empty()).then(|| Turn {
        role: None,
        parts: instruction_parts,
    });
    (instruction, turns)
}

/// Gemini backend.
pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    /// Builds the adapter and its HTTP client.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Builds the adapter from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.config.base_url, model, self.config.api_key
        )
    }

    async fn post_generate(&self, model: &str, payload: &GeneratePayload) -> Result<GenerateReply> {
        debug!(%model, "posting generateContent");

        let response = self
            .client
            .post(self.endpoint(model))
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Network(sanitize_api_error(&e.to_string())))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(Error::RateLimit);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(sanitize_api_error(&body)));
        }

        response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn supports_tools(&self) -> bool {
        false
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

        let (system_instruction, contents) = wire_turns(&request.messages);
        let payload = GeneratePayload {
            contents,
            system_instruction,
            generation_config: Some(Tuning {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            }),
        };

        let reply = self.post_generate(&model, &payload).await?;
        let candidate = reply
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("reply carried no candidates".to_string()))?;

        let content: String = candidate
            .content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();

        let usage = match reply.usage_metadata {
            Some(counts) => TokenUsage {
                prompt_tokens: counts.prompt_token_count,
                completion_tokens: counts.candidates_token_count.unwrap_or(0),
                total_tokens: counts.total_token_count,
            },
            None => TokenUsage::default(),
        };

        Ok(CompletionResponse {
            content,
            usage,
            tool_calls: Vec::new(),
            finish_reason: candidate.finish_reason,
            // generateContent does not echo the model back
            model,
        })
    }
}
