use crate::retry::classify;
use crate::IngestError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * attempt`
    Linear,
    /// `base * 2^(attempt - 1)`
    Exponential,
}

/// Retry settings for one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_retries,
            base_delay,
            backoff,
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(attempt),
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt - 1);
                self.base_delay.saturating_mul(factor)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000), Backoff::Exponential)
    }
}

/// Runs `operation`, retrying while its failures classify as transient
///
/// Permanent and unknown failures are returned immediately. After
/// `max_retries` retries the last error is returned. Cancellation is observed
/// between attempts and during the backoff sleep.
///
/// # Arguments
///
/// * `policy` - Retry count and backoff
/// * `cancel` - Cooperative cancellation signal
/// * `operation` - Produces a fresh future for every attempt
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, IngestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, IngestError>>,
{
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let class = classify(&error);
        if !class.is_retryable() || attempt >= policy.max_retries {
            if class.is_retryable() {
                tracing::warn!(
                    classification = %class,
                    attempts = attempt + 1,
                    "Giving up after retries: {}",
                    error
                );
            }
            return Err(error);
        }

        attempt += 1;
        let delay = policy.delay_for(attempt);
        tracing::warn!(
            classification = %class,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Transient failure, retrying: {}",
            error
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
