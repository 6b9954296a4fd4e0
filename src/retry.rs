//! Retry Mechanism Module
//!
//! Retry policy for provider HTTP calls: exponential backoff with optional
//! jitter, transient-only classification, and `retry_after` honoring.
//! Streaming connections are never retried mid-stream; only whole calls go
//! through the executor.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::AiError;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (the first call counts as one).
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `base_delay * 2^(n-1)`.
    pub base_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Whether to add jitter to delays.
    pub use_jitter: bool,
    /// Maximum jitter fraction (0.0 to 1.0).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4, // 1 call + 3 retries
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            use_jitter: false,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Policy with `max_retries` retries after the initial attempt.
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_retries.saturating_add(1),
            base_delay,
            ..Default::default()
        }
    }

    /// Enable jittered delays.
    pub const fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    /// Whether the policy retries this error at all.
    pub fn should_retry(&self, error: &AiError) -> bool {
        error.is_retryable()
    }

    /// Delay before the retry following failed attempt `attempt` (1-based).
    ///
    /// A provider-supplied `retry_after` takes precedence over backoff;
    /// code-default retry hints do not.
    pub fn delay_for(&self, attempt: u32, error: &AiError) -> Duration {
        if error.retry_after_explicit && !error.retry_after.is_zero() {
            return error.retry_after.min(self.max_delay);
        }
        let exp = self.base_delay.as_millis() as f64 * 2f64.powi(attempt.saturating_sub(1) as i32);
        let delay = Duration::from_millis(exp as u64).min(self.max_delay);
        if self.use_jitter {
            self.add_jitter(delay)
        } else {
            delay
        }
    }

    fn add_jitter(&self, delay: Duration) -> Duration {
        let mut rng = rand::thread_rng();
        let range = delay.as_millis() as f64 * self.jitter_factor;
        let jitter = rng.gen_range(-range..=range);
        Duration::from_millis((delay.as_millis() as f64 + jitter).max(0.0) as u64)
    }

    /// Run `operation` under this policy.
    ///
    /// Non-transient errors break the loop immediately. Backoff sleeps race
    /// against `cancel`; cancellation surfaces as the last error.
    pub async fn execute<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, AiError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, AiError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Err(AiError::canceled());
            }
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !self.should_retry(&error) || attempt == attempts {
                        return Err(error);
                    }
                    let delay = self.delay_for(attempt, &error);
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        code = %error.code,
                        "retrying after transient provider error"
                    );
                    last_error = Some(error);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(AiError::canceled()),
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AiError::internal("retry loop produced no error")))
    }
}
