//! The agent execution template.
//!
//! Every role runs through the same skeleton:
//!
//! 1. Validate the input against the role's contract (terminal on failure)
//! 2. Gather context from registered sources in registration order
//! 3. Append the user turn to the cumulative history
//! 4. Call the provider gateway with the full history, with bounded retries
//! 5. Append the reply and decode it into the role's output contract
//!
//! Histories are cumulative across runs, so a follow-up request sees every
//! earlier exchange of the same agent.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use maestro_llm::{
    retry_with_backoff, CompletionRequest, Message, ProviderGateway, RetryConfig, TokenUsage,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::context::{gather_context, ContextSource};
use crate::contract::{AgentInput, AgentOutput};
use crate::decode::{decode_output, DecodePath};
use crate::error::{Error, Result};
use crate::role::AgentRole;

fn default_retries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

/// Per-agent execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Attempts per run, the initial call included.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Wall-clock budget per gateway call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Model override; the backend's default model when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion token budget.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            timeout_secs: default_timeout_secs(),
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl AgentConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt budget.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Pins a model instead of the backend default.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the completion token budget.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Observable lifecycle of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Constructed, nothing running.
    Idle,
    /// Gathering context.
    Thinking,
    /// Waiting on the provider.
    Executing,
    /// Last run produced an output.
    Completed,
    /// Last run failed.
    Failed,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Thinking => "thinking",
            AgentStatus::Executing => "executing",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Outcome of one successful agent run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRunResult {
    /// The decoded, contract-conforming output.
    pub output: AgentOutput,
    /// Whether decoding was strict or heuristic.
    pub path: DecodePath,
    /// Token usage of the successful attempt.
    pub usage: TokenUsage,
    /// Gateway calls made, the successful one included.
    pub attempts: u32,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

/// A role-bound agent executing against the provider gateway.
pub struct Agent {
    id: Uuid,
    role: AgentRole,
    config: AgentConfig,
    gateway: Arc<ProviderGateway>,
    sources: Vec<Arc<dyn ContextSource>>,
    history: Vec<Message>,
    status: AgentStatus,
}

impl Agent {
    /// Creates an idle agent. The history starts with the role's system
    /// prompt and accumulates from there.
    pub fn new(role: AgentRole, gateway: Arc<ProviderGateway>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            config: AgentConfig::default(),
            gateway,
            sources: Vec::new(),
            history: vec![Message::system(role.system_prompt())],
            status: AgentStatus::Idle,
        }
    }

    /// Replaces the execution settings.
    #[must_use]
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a context source. Sources are gathered in registration
    /// order on every run.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn ContextSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Registers a context source on an existing agent.
    pub fn add_source(&mut self, source: Arc<dyn ContextSource>) {
        self.sources.push(source);
    }

    /// Unique id of this agent instance.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The bound role.
    #[must_use]
    pub fn role(&self) -> AgentRole {
        self.role
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> AgentStatus {
        self.status
    }

    /// The cumulative turn history, system prompt first.
    #[must_use]
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Runs the template once.
    ///
    /// Validation failures are terminal and never retried. Gateway failures
    /// are retried with exponential backoff (1s, 2s, 4s, ...) up to the
    /// configured attempt budget.
    #[instrument(skip(self, input), fields(agent_id = %self.id, role = %self.role))]
    pub async fn run(&mut self, input: AgentInput) -> Result<AgentRunResult> {
        let started = Instant::now();

        if input.role() != self.role {
            self.status = AgentStatus::Failed;
            return Err(Error::InvalidInput(format!(
                "input for role '{}' sent to a '{}' agent",
                input.role(),
                self.role
            )));
        }
        if let Err(e) = input.validate() {
            self.status = AgentStatus::Failed;
            return Err(e);
        }

        self.status = AgentStatus::Thinking;
        let context = gather_context(&self.sources).await;

        // The user turn is appended once; retries reuse the same history.
        let user_turn = if context.is_empty() {
            input.render()
        } else {
            format!("Context:\n{context}\n\n{}", input.render())
        };
        self.history.push(Message::user(user_turn));

        self.status = AgentStatus::Executing;
        let request = self.build_request();
        let retry = RetryConfig::new()
            .with_max_attempts(self.config.retries.max(1))
            .with_initial_delay(Duration::from_secs(1))
            .with_backoff_multiplier(2.0)
            .with_jitter(false);
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let attempts = AtomicU32::new(0);
        let gateway = self.gateway.clone();

        let outcome = retry_with_backoff(
            &retry,
            || {
                attempts.fetch_add(1, Ordering::Relaxed);
                let gateway = gateway.clone();
                let request = request.clone();
                async move {
                    match tokio::time::timeout(timeout, gateway.execute(request)).await {
                        Ok(result) => result,
                        Err(_) => Err(maestro_llm::Error::Timeout(timeout.as_millis() as u64)),
                    }
                }
            },
            // Configuration problems will not heal between attempts
            |e| {
                !matches!(
                    e,
                    maestro_llm::Error::NotConfigured(_) | maestro_llm::Error::NoProviders
                )
            },
        )
        .await;

        match outcome {
            Ok(response) => {
                self.history.push(Message::assistant(&response.content));
                let decoded = decode_output(self.role, &response.content);
                self.status = AgentStatus::Completed;
                let attempts = attempts.load(Ordering::Relaxed);
                info!(
                    path = %decoded.path,
                    attempts,
                    tokens = response.usage.total_tokens,
                    "agent run completed"
                );
                Ok(AgentRunResult {
                    output: decoded.value,
                    path: decoded.path,
                    usage: response.usage,
                    attempts,
                    duration_ms: started.elapsed().as_millis() as u64,
                })
            }
            Err(retry_error) => {
                self.status = AgentStatus::Failed;
                warn!(
                    attempts = retry_error.attempts,
                    error = %retry_error.last_error,
                    "agent run failed"
                );
                Err(Error::RetriesExhausted {
                    attempts: retry_error.attempts,
                    last: retry_error.last_error,
                })
            }
        }
    }

    fn build_request(&self) -> CompletionRequest {
        CompletionRequest::new(self.config.model.clone().unwrap_or_default())
            .with_messages(self.history.clone())
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticSource;
    use crate::contract::{FrontendInput, QaInput};
    use maestro_llm::{GatewayConfig, MockProvider};

    fn gateway_with(provider: Arc<MockProvider>) -> Arc<ProviderGateway> {
        let config = GatewayConfig::default()
            .with_retry_attempts(1)
            .with_fallback(false);
        let mut gateway = ProviderGateway::new(config);
        gateway.register_instance("mock", provider);
        Arc::new(gateway)
    }

    #[tokio::test]
    async fn test_wrong_role_input_is_terminal() {
        let provider = Arc::new(MockProvider::new("mock"));
        let mut agent = Agent::new(AgentRole::Frontend, gateway_with(provider.clone()));

        let err = agent
            .run(AgentInput::Qa(QaInput::new("code")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(agent.status(), AgentStatus::Failed);
        // No provider call was made
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_run_appends_user_and_assistant_turns() {
        let provider = Arc::new(MockProvider::new("mock"));
        provider.queue_response("```json\n{\"code\": \"const A = 1;\"}\n```");
        let mut agent = Agent::new(AgentRole::Frontend, gateway_with(provider));

        assert_eq!(agent.history().len(), 1); // system prompt

        let result = agent
            .run(AgentInput::Frontend(FrontendInput::new("board", "Card")))
            .await
            .unwrap();

        assert_eq!(result.path, DecodePath::Strict);
        assert_eq!(result.attempts, 1);
        assert_eq!(agent.status(), AgentStatus::Completed);
        assert_eq!(agent.history().len(), 3); // system + user + assistant
        assert_eq!(agent.history()[1].content, "Feature: board\nComponent: Card\nFramework: react\nStyling: tailwind");
    }

    #[tokio::test]
    async fn test_history_accumulates_across_runs() {
        let provider = Arc::new(MockProvider::new("mock"));
        let mut agent = Agent::new(AgentRole::Qa, gateway_with(provider));

        agent.run(AgentInput::Qa(QaInput::new("fn a() {}"))).await.unwrap();
        agent.run(AgentInput::Qa(QaInput::new("fn b() {}"))).await.unwrap();

        // system + 2 * (user + assistant)
        assert_eq!(agent.history().len(), 5);
    }

    #[tokio::test]
    async fn test_context_is_prepended_to_the_user_turn() {
        let provider = Arc::new(MockProvider::new("mock"));
        let mut agent = Agent::new(AgentRole::Qa, gateway_with(provider))
            .with_source(Arc::new(StaticSource::new("style", "prefer guard clauses")));

        agent.run(AgentInput::Qa(QaInput::new("fn a() {}"))).await.unwrap();

        let user_turn = &agent.history()[1].content;
        assert!(user_turn.starts_with("Context:\n[style]\nprefer guard clauses"));
        assert!(user_turn.contains("Review the following code:"));
    }

    #[tokio::test]
    async fn test_gateway_failures_are_retried_then_exhausted() {
        let provider = Arc::new(MockProvider::new("mock"));
        provider.queue_error(maestro_llm::Error::RateLimit);
        provider.queue_error(maestro_llm::Error::RateLimit);
        provider.queue_error(maestro_llm::Error::RateLimit);

        let config = AgentConfig::new().with_retries(3);
        let mut agent = Agent::new(AgentRole::Qa, gateway_with(provider.clone()))
            .with_config(config);

        // Keep the test fast: the first backoff delay is one second, so
        // advance virtual time instead of sleeping through it.
        tokio::time::pause();
        let err = agent.run(AgentInput::Qa(QaInput::new("code"))).await.unwrap_err();
        tokio::time::resume();

        match err {
            Error::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected RetriesExhausted, got {other}"),
        }
        assert_eq!(agent.status(), AgentStatus::Failed);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_recovers_on_second_attempt() {
        let provider = Arc::new(MockProvider::new("mock"));
        provider.queue_error(maestro_llm::Error::Network("reset".into()));
        provider.queue_response("all good, pass");

        let mut agent = Agent::new(AgentRole::Qa, gateway_with(provider.clone()));

        tokio::time::pause();
        let result = agent.run(AgentInput::Qa(QaInput::new("code"))).await.unwrap();
        tokio::time::resume();

        assert_eq!(result.attempts, 2);
        assert_eq!(result.path, DecodePath::Heuristic);
        assert!(result.output.as_qa().unwrap().passed());
        assert_eq!(provider.calls(), 2);
    }
}
