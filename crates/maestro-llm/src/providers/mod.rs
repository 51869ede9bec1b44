//! One adapter module per backend.
//!
//! Everything above this layer works with [`crate::provider::LlmProvider`];
//! the adapters keep each backend's wire format to themselves.

pub mod anthropic;
pub mod gemini;
pub mod openai;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use gemini::{GeminiConfig, GeminiProvider};
pub use openai::{OpenAiConfig, OpenAiProvider};
