use anyhow::{Context, Result};
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Bounded retry with linear backoff: the wait after attempt `n` is
/// `backoff_base × n`.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 3_000,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, backoff_base_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base_ms,
        }
    }

    /// Same backoff, one attempt only.
    pub fn single_shot(self) -> Self {
        Self {
            max_attempts: 1,
            ..self
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(attempt as u64))
    }

    /// Sleeps before the next attempt. Nothing to wait for after the last one.
    pub async fn backoff(&self, attempt: u32) {
        if attempt < self.max_attempts {
            tokio::time::sleep(self.delay_for(attempt)).await;
        }
    }
}

/// Statuses that mean "try again later" rather than "no".
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
}

/// Runs an idempotent operation up to `config.max_attempts` times.
///
/// Only for reads. Anything with an irreversible side effect must not go
/// through here.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) if attempt >= max_attempts => {
                let error_msg = format!("{}", e);
                return Err(e).context(format!(
                    "{} failed after {} attempts. Last error: {}",
                    operation_name, max_attempts, error_msg
                ));
            }
            Err(e) => {
                let delay = config.delay_for(attempt);
                debug!(
                    "{} failed (attempt {}/{}). Retrying in {:?}: {}",
                    operation_name, attempt, max_attempts, delay, e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
