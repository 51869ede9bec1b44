//! The backend adapter trait.
//!
//! One implementation per backend; the gateway and the agents above it only
//! ever see this surface.

use crate::completion::{CompletionRequest, CompletionResponse};
use crate::error::Result;

/// A backend that can serve completions.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stable identifier used in registration, selection and logs.
    fn name(&self) -> &str;

    /// Whether this backend can execute tool calls.
    fn supports_tools(&self) -> bool;

    /// Models this backend advertises.
    fn available_models(&self) -> Vec<String>;

    /// Model used when a request leaves `model` empty.
    fn default_model(&self) -> &str;

    /// Serves one completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}
