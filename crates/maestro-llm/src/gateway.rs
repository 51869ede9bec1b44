//! Provider gateway - backend selection, retry and fallback
//!
//! The gateway owns a set of registered backends and, per call:
//! - selects one according to the configured policy (round-robin / random /
//!   fixed),
//! - builds or reuses the cached client for it,
//! - executes the request under a per-call timeout with bounded retry,
//! - falls back to the next enabled backend when the selected one is
//!   exhausted and fallback is enabled.
//!
//! Clients are constructed lazily. Construction is idempotent: a concurrent
//! first use may build an equivalent client twice and the spare copy is
//! dropped.

use crate::completion::{CompletionRequest, CompletionResponse};
use crate::error::{Error, Result};
use crate::provider::LlmProvider;
use crate::retry::{retry_with_backoff, RetryConfig};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// How the gateway picks a backend for each call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Cycle through enabled backends in registration order, wrapping
    #[default]
    RoundRobin,
    /// Pick uniformly among enabled backends
    Random,
    /// Always use the configured default backend
    Fixed,
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Backend selection policy
    #[serde(default)]
    pub policy: SelectionPolicy,
    /// Default backend for the fixed policy
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Enabled backend ids; empty means every registered backend is enabled
    #[serde(default)]
    pub enabled: Vec<String>,
    /// Advance to the next enabled backend when one is exhausted
    #[serde(default = "default_fallback_enabled")]
    pub fallback_enabled: bool,
    /// Attempts per backend (initial call included)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Base backoff delay in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Per-call timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_fallback_enabled() -> bool {
    true
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::default(),
            default_provider: None,
            enabled: Vec::new(),
            fallback_enabled: default_fallback_enabled(),
            retry_attempts: default_retry_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    /// Set the selection policy
    #[must_use]
    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the default backend (fixed policy)
    #[must_use]
    pub fn with_default_provider(mut self, id: impl Into<String>) -> Self {
        self.default_provider = Some(id.into());
        self
    }

    /// Restrict the enabled backend set
    #[must_use]
    pub fn with_enabled(mut self, ids: Vec<String>) -> Self {
        self.enabled = ids;
        self
    }

    /// Enable or disable cross-backend fallback
    #[must_use]
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// Set attempts per backend
    #[must_use]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Set the base backoff delay
    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base_ms = base.as_millis() as u64;
        self
    }

    /// Set the per-call timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }
}

/// Factory that constructs a backend client on first use
pub type ProviderFactory = Box<dyn Fn() -> Result<Arc<dyn LlmProvider>> + Send + Sync>;

/// Gateway over interchangeable LLM backends
pub struct ProviderGateway {
    config: GatewayConfig,
    factories: HashMap<String, ProviderFactory>,
    /// Registration order; selection policies iterate this
    order: Vec<String>,
    clients: DashMap<String, Arc<dyn LlmProvider>>,
    cursor: AtomicUsize,
}

impl ProviderGateway {
    /// Create a gateway with the given configuration
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            factories: HashMap::new(),
            order: Vec::new(),
            clients: DashMap::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Current configuration
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Register a backend by id with a lazy construction factory
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Arc<dyn LlmProvider>> + Send + Sync + 'static,
    {
        let id = id.into();
        debug!(provider = %id, "registering backend");
        if !self.order.contains(&id) {
            self.order.push(id.clone());
        }
        self.factories.insert(id, Box::new(factory));
    }

    /// Register an already-constructed backend instance
    pub fn register_instance(&mut self, id: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.register(id, move || Ok(provider.clone()));
    }

    /// Registered backend ids in registration order
    #[must_use]
    pub fn providers(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Check if a backend is registered
    #[must_use]
    pub fn has_provider(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Enabled backend ids in registration order
    #[must_use]
    pub fn enabled_providers(&self) -> Vec<String> {
        if self.config.enabled.is_empty() {
            return self.order.clone();
        }
        self.order
            .iter()
            .filter(|id| self.config.enabled.iter().any(|e| e == *id))
            .cloned()
            .collect()
    }

    /// Select a backend for one call according to the configured policy
    pub fn select_provider(&self) -> Result<String> {
        let enabled = self.enabled_providers();
        if enabled.is_empty() {
            return Err(Error::NoProviders);
        }

        let id = match self.config.policy {
            SelectionPolicy::RoundRobin => {
                let i = self.cursor.fetch_add(1, Ordering::Relaxed) % enabled.len();
                enabled[i].clone()
            }
            SelectionPolicy::Random => {
                let i = rand::thread_rng().gen_range(0..enabled.len());
                enabled[i].clone()
            }
            SelectionPolicy::Fixed => {
                let id = self
                    .config
                    .default_provider
                    .clone()
                    .ok_or_else(|| Error::NotConfigured("no default provider set".to_string()))?;
                if !enabled.contains(&id) {
                    return Err(Error::NotConfigured(id));
                }
                id
            }
        };

        debug!(provider = %id, policy = ?self.config.policy, "selected backend");
        Ok(id)
    }

    /// Build or reuse the cached client for a backend
    ///
    /// On a concurrent first use both callers may run the factory; the first
    /// insert wins and the losing copy is dropped.
    pub fn client(&self, id: &str) -> Result<Arc<dyn LlmProvider>> {
        if let Some(existing) = self.clients.get(id) {
            return Ok(existing.clone());
        }

        let factory = self
            .factories
            .get(id)
            .ok_or_else(|| Error::NotConfigured(id.to_string()))?;
        let built = factory()?;
        debug!(provider = %id, "constructed backend client");

        Ok(self
            .clients
            .entry(id.to_string())
            .or_insert(built)
            .value()
            .clone())
    }

    /// Execute a request against the policy-selected backend
    ///
    /// Retries the selected backend up to `retry_attempts` with exponential
    /// backoff, then walks the remaining enabled backends when fallback is
    /// on. Fails with [`Error::Exhausted`] carrying the last underlying error
    /// once every eligible backend has been tried.
    #[instrument(skip(self, request), fields(model = %request.model, policy = ?self.config.policy))]
    pub async fn execute(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let enabled = self.enabled_providers();
        if enabled.is_empty() {
            return Err(Error::NoProviders);
        }

        let retry = RetryConfig::new()
            .with_max_attempts(self.config.retry_attempts.max(1))
            .with_initial_delay(Duration::from_millis(self.config.backoff_base_ms))
            .with_jitter(false);

        let mut current = self.select_provider()?;
        let mut tried: Vec<String> = Vec::new();
        let mut total_attempts: u32 = 0;

        loop {
            let outcome = match self.client(&current) {
                Ok(provider) => self
                    .attempt_provider(&retry, provider, &request)
                    .await
                    .map_err(|e| (e.last_error, e.attempts)),
                // Construction failure counts as a single attempt
                Err(e) => Err((e, 1)),
            };

            match outcome {
                Ok(response) => {
                    debug!(
                        provider = %current,
                        tokens = response.usage.total_tokens,
                        "completion succeeded"
                    );
                    return Ok(response);
                }
                Err((last, attempts)) => {
                    total_attempts += attempts;
                    tried.push(current.clone());

                    if !self.config.fallback_enabled {
                        return Err(Error::Exhausted {
                            attempts: total_attempts,
                            last: Box::new(last),
                        });
                    }

                    match next_fallback(&enabled, &current, &tried) {
                        Some(next) => {
                            warn!(
                                from = %current,
                                to = %next,
                                error = %last,
                                "backend exhausted, falling back"
                            );
                            current = next;
                        }
                        None => {
                            return Err(Error::Exhausted {
                                attempts: total_attempts,
                                last: Box::new(last),
                            });
                        }
                    }
                }
            }
        }
    }

    /// Execute a request against a specific backend, without retry/fallback
    pub async fn execute_with(
        &self,
        id: &str,
        request: CompletionRequest,
    ) -> Result<CompletionResponse> {
        let provider = self.client(id)?;
        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        let request = with_model_default(request, provider.as_ref());
        match tokio::time::timeout(timeout, provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(timeout.as_millis() as u64)),
        }
    }

    async fn attempt_provider(
        &self,
        retry: &RetryConfig,
        provider: Arc<dyn LlmProvider>,
        request: &CompletionRequest,
    ) -> std::result::Result<CompletionResponse, crate::retry::RetryError<Error>> {
        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        retry_with_backoff(
            retry,
            || {
                let provider = provider.clone();
                let request = with_model_default(request.clone(), provider.as_ref());
                async move {
                    match tokio::time::timeout(timeout, provider.complete(request)).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::Timeout(timeout.as_millis() as u64)),
                    }
                }
            },
            Error::is_retryable,
        )
        .await
    }
}

/// Fill in the backend's default model when the request leaves it unset.
fn with_model_default(mut request: CompletionRequest, provider: &dyn LlmProvider) -> CompletionRequest {
    if request.model.is_empty() {
        request.model = provider.default_model().to_string();
    }
    request
}

/// Next enabled backend after `current`, wrapping, skipping already-tried ids
fn next_fallback(enabled: &[String], current: &str, tried: &[String]) -> Option<String> {
    let pos = enabled.iter().position(|id| id == current).unwrap_or(0);
    enabled
        .iter()
        .cycle()
        .skip(pos + 1)
        .take(enabled.len())
        .find(|id| !tried.iter().any(|t| t == *id))
        .cloned()
}
