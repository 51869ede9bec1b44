//! Mock provider for testing
//!
//! Scripted provider used by gateway and pipeline tests. Queue replies or
//! errors ahead of time; each `complete` call pops the front of the queue
//! and falls back to a canned reply when the queue is empty. Requests are
//! recorded in call order so tests can assert on the prompts agents sent.

use crate::completion::{CompletionRequest, CompletionResponse, TokenUsage};
use crate::error::{Error, Result};
use crate::provider::LlmProvider;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Scripted LLM provider
pub struct MockProvider {
    name: String,
    default_model: String,
    responses: Arc<Mutex<VecDeque<Result<CompletionResponse>>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    calls: Arc<AtomicU32>,
}

impl MockProvider {
    /// Create a mock provider with the given name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_model: "mock-model".to_string(),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Set the default model name
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Queue a successful reply with the given content
    pub fn queue_response(&self, content: impl Into<String>) {
        let response = self.make_response(content.into());
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue a full response
    pub fn queue_full_response(&self, response: CompletionResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue an error
    pub fn queue_error(&self, error: Error) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Number of `complete` calls observed
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of queued results not yet consumed
    #[must_use]
    pub fn queued(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    /// Requests observed so far, in call order
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn make_response(&self, content: String) -> CompletionResponse {
        let completion_tokens = content.split_whitespace().count() as u32;
        CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens,
                total_tokens: 10 + completion_tokens,
            },
            tool_calls: Vec::new(),
            finish_reason: Some("stop".to_string()),
            model: self.default_model.clone(),
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_tools(&self) -> bool {
        false
    }

    fn available_models(&self) -> Vec<String> {
        vec![self.default_model.clone()]
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        let queued = self.responses.lock().unwrap().pop_front();
        match queued {
            Some(result) => result,
            None => Ok(self.make_response("mock response".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::Message;

    #[tokio::test]
    async fn test_queued_responses_pop_in_order() {
        let provider = MockProvider::new("mock");
        provider.queue_response("first");
        provider.queue_response("second");

        let request = CompletionRequest::new("").with_message(Message::user("hi"));

        let first = provider.complete(request.clone()).await.unwrap();
        assert_eq!(first.content, "first");

        let second = provider.complete(request.clone()).await.unwrap();
        assert_eq!(second.content, "second");

        // Queue drained: canned reply
        let third = provider.complete(request).await.unwrap();
        assert_eq!(third.content, "mock response");
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_queued_error_surfaces() {
        let provider = MockProvider::new("mock");
        provider.queue_error(Error::RateLimit);

        let request = CompletionRequest::new("");
        let result = provider.complete(request).await;
        assert!(matches!(result, Err(Error::RateLimit)));
    }

    #[tokio::test]
    async fn test_requests_are_recorded_in_call_order() {
        let provider = MockProvider::new("mock");

        let first = CompletionRequest::new("").with_message(Message::user("one"));
        let second = CompletionRequest::new("").with_message(Message::user("two"));
        provider.complete(first).await.unwrap();
        provider.complete(second).await.unwrap();

        let seen = provider.requests();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].messages[0].content, "one");
        assert_eq!(seen[1].messages[0].content, "two");
    }

    #[test]
    fn test_usage_always_populated() {
        let provider = MockProvider::new("mock");
        let response = provider.make_response("three words here".to_string());
        assert_eq!(response.usage.completion_tokens, 3);
        assert_eq!(response.usage.total_tokens, 13);
    }
}
