//! Retry policies with exponential backoff
//!
//! Retries transient gateway failures for fetches. Writes are never retried:
//! a create that timed out may still have been committed.

use log::{debug, info, warn};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::cancel::{CancellableOperation, Interrupt};
use crate::error::{GatewayError, LoadError};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

/// Retry policy that implements exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `attempt` inside `op` until it succeeds, fails permanently, runs out
    /// of attempts, or the operation is cancelled. Every attempt and every
    /// backoff sleep is a cancellation point.
    pub async fn execute<F, Fut, T>(&self, op: &CancellableOperation, attempt: F) -> Result<T, LoadError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);

        for number in 1..=max_attempts {
            debug!("[{}] {} attempt {}/{}", op.id(), op.name(), number, max_attempts);

            let error = match op.run("fetch", attempt()).await {
                Ok(Ok(value)) => {
                    if number > 1 {
                        info!("[{}] {} succeeded after {} attempts", op.id(), op.name(), number);
                    }
                    return Ok(value);
                }
                Ok(Err(error)) => error,
                Err(Interrupt::Cancelled) => return Err(LoadError::Cancelled),
                Err(Interrupt::TimedOut(limit)) => GatewayError::Timeout(limit),
            };

            let should_retry = error.is_transient();
            if !should_retry || number == max_attempts {
                warn!(
                    "[{}] {} failed permanently on attempt {} (should_retry: {}): {}",
                    op.id(), op.name(), number, should_retry, error
                );
                return Err(LoadError::LoadFailed(error));
            }

            warn!("[{}] {} failed on attempt {} (retryable): {}", op.id(), op.name(), number, error);
            let delay = self.calculate_delay(number);
            debug!("[{}] waiting {:?} before retry", op.id(), delay);
            op.sleep(delay).await?;
        }

        // max_attempts >= 1, so the loop always returns
        Err(LoadError::Cancelled)
    }

    /// Calculate exponential backoff delay with optional jitter
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_ms = (self.config.base_delay.as_millis() as f64) * self.config.backoff_multiplier.powi(exponent);

        let mut delay = Duration::from_millis(delay_ms as u64);
        if delay > self.config.max_delay {
            delay = self.config.max_delay;
        }

        if self.config.jitter {
            let jitter_factor = rand::rng().random_range(0.5..=1.5);
            delay = Duration::from_millis((delay.as_millis() as f64 * jitter_factor) as u64);
        }

        delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
