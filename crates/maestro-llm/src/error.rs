//! Error types for maestro-llm

use thiserror::Error;

/// LLM error type
#[derive(Debug, Error)]
pub enum Error {
    /// Provider not configured
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// API error
    #[error("api error: {0}")]
    Api(String),

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimit,

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// No enabled providers to select from
    #[error("no enabled providers")]
    NoProviders,

    /// Every eligible provider was exhausted
    #[error("all providers exhausted after {attempts} attempts: {last}")]
    Exhausted {
        /// Total attempts across all providers
        attempts: u32,
        /// Last underlying error
        last: Box<Error>,
    },
}

impl Error {
    /// Whether a retry could plausibly succeed.
    ///
    /// Network faults, timeouts, rate limits and upstream API errors are
    /// transient; configuration and response-shape errors are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Api(_) | Self::RateLimit | Self::Network(_) | Self::Timeout(_)
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
