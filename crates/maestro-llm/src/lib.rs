//! Maestro LLM - Provider abstraction and gateway
//!
//! This crate provides the LLM layer for Maestro:
//! - Provider: the trait every backend adapter implements
//! - Gateway: per-call backend selection (round-robin / random / fixed),
//!   bounded retry with exponential backoff, cross-backend fallback and a
//!   lazy client cache
//! - Adapters: Anthropic (Messages API), OpenAI (Chat Completions),
//!   Google Gemini (generateContent)
//! - Mock: scripted provider for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod completion;
pub mod error;
pub mod gateway;
pub mod mock;
pub mod provider;
pub mod providers;
pub mod retry;
pub mod util;

pub use completion::{
    CompletionRequest, CompletionResponse, Message, MessageRole, TokenUsage, ToolCall,
};
pub use error::{Error, Result};
pub use gateway::{GatewayConfig, ProviderGateway, SelectionPolicy};
pub use mock::MockProvider;
pub use provider::LlmProvider;
pub use retry::{retry_with_backoff, retry_with_backoff_using, RetryConfig, RetryError};

// Re-export provider types
pub use providers::{
    AnthropicConfig, AnthropicProvider, GeminiConfig, GeminiProvider, OpenAiConfig, OpenAiProvider,
};
