//! Bounded retry with exponential backoff.
//!
//! Delay computation is a pure function of the attempt number, and the sleep
//! itself is injectable, so backoff schedules are assertable in tests without
//! waiting on real timers.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Shape of the backoff schedule.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempt budget, the initial call included.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Ceiling no computed delay exceeds.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
    /// Whether delays get a random spread added.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// The default schedule: three attempts, 500ms doubling, jittered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the delay after the first failure.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the delay ceiling.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Turns the random spread on or off.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based).
    ///
    /// `initial_delay * multiplier^(attempt-1)`, clipped to `max_delay`, with
    /// up to 25% added on top when jitter is on.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let nominal =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let clipped = nominal.min(self.max_delay.as_millis() as f64) as u64;

        let spread = clipped / 4;
        let final_ms = if self.jitter && spread > 0 {
            clipped + rand::thread_rng().gen_range(0..spread)
        } else {
            clipped
        };
        Duration::from_millis(final_ms)
    }
}

/// Exhausted budget: the last error plus how many attempts were spent.
#[derive(Debug)]
pub struct RetryError<E> {
    /// Error from the final attempt.
    pub last_error: E,
    /// Attempts spent, the initial call included.
    pub attempts: u32,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gave up after {} attempts: {}", self.attempts, self.last_error)
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for RetryError<E> {}

/// Runs `operation` under the schedule, sleeping with `tokio::time::sleep`.
///
/// `is_retryable` decides per error whether another attempt makes sense;
/// a `false` there ends the loop immediately, budget left or not.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    config: &RetryConfig,
    operation: F,
    is_retryable: R,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Debug,
{
    retry_with_backoff_using(config, operation, is_retryable, tokio::time::sleep).await
}

/// Same as [`retry_with_backoff`] with the sleep supplied by the caller.
///
/// Tests pass a recording closure here and assert on the exact delays the
/// schedule produced.
pub async fn retry_with_backoff_using<T, E, F, Fut, R, S, SFut>(
    config: &RetryConfig,
    mut operation: F,
    is_retryable: R,
    sleep: S,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    S: Fn(Duration) -> SFut,
    SFut: Future<Output = ()>,
    E: std::fmt::Debug,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "attempt succeeded after earlier failures");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if attempt >= config.max_attempts || !is_retryable(&error) {
            debug!(attempt, error = ?error, "giving up");
            return Err(RetryError {
                last_error: error,
                attempts: attempt,
            });
        }

        let delay = config.delay_for(attempt);
        warn!(
            attempt,
            budget = config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = ?error,
            "attempt failed, backing off"
        );
        sleep(delay).await;
    }
}
