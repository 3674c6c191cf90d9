use rand::Rng;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::error::RpcError;
use crate::logging::{ErrorLogger, LogContext};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of physical attempts per logical call
    pub max_attempts: u32,
    /// Initial backoff window; doubled after every attempt
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Exponential backoff with full jitter.
///
/// Between two failed attempts the manager sleeps a duration drawn uniformly
/// from `[0, scale)`, where `scale` starts at `base_delay` and doubles after
/// each attempt. Only errors for which [`RpcError::is_retryable`] holds are
/// retried; anything else is returned on first sight.
pub struct RetryManager {
    config: RetryConfig,
    operation_name: String,
}

impl RetryManager {
    pub fn new(operation_name: &str, config: RetryConfig) -> Self {
        Self {
            config,
            operation_name: operation_name.to_string(),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, RpcError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, RpcError>>,
    {
        let started = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        ErrorLogger::log_recovery_success(
                            &self.operation_name,
                            attempt,
                            started.elapsed().as_millis() as u64,
                        );
                    }
                    return Ok(result);
                }
                Err(error) if !error.is_retryable() => {
                    LogContext::new("retry", &self.operation_name)
                        .with_attempt(attempt)
                        .debug(&format!("Non-retryable error, aborting: {}", error));
                    return Err(error);
                }
                Err(error) => {
                    ErrorLogger::log_retry_attempt(&self.operation_name, &error, attempt, max_attempts);
                    last_error = Some(error);

                    if attempt < max_attempts {
                        sleep(self.backoff_delay(attempt)).await;
                    }
                }
            }
        }

        // The loop runs at least once, so a failure was always recorded
        let last = last_error.unwrap_or(RpcError::MissingResult);
        Err(RpcError::Exhausted {
            attempts: max_attempts,
            last: Box::new(last),
        })
    }

    /// Upper bound of the wait that follows the given (1-based) attempt
    pub fn backoff_window(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(31);
        self.config.base_delay.saturating_mul(1u32 << doublings)
    }

    /// Random wait drawn uniformly from `[0, backoff_window(attempt))`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let window = self.backoff_window(attempt);
        if window.is_zero() {
            return Duration::ZERO;
        }
        rand::thread_rng().gen_range(Duration::ZERO..window)
    }
}
