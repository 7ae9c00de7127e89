//! Retry with exponential backoff for upstream calls.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::ApiError;
use crate::config::HttpConfig;

/// Jitter applied on top of the exponential delay, as a fraction of it.
const JITTER_FACTOR: f64 = 0.3;

/// Upper bound for a single backoff sleep.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(8);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_http(&HttpConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_http(http: &HttpConfig) -> Self {
        Self {
            max_attempts: http.max_attempts.max(1),
            base_delay: Duration::from_millis(http.base_delay_ms),
            max_delay: MAX_RETRY_DELAY,
        }
    }

    /// Retry immediately; used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1),
    /// capped, with +/- jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = 2u32.saturating_pow(attempt.saturating_sub(1));
        let capped = self.base_delay.saturating_mul(exp).min(self.max_delay);
        if capped.is_zero() {
            return capped;
        }

        let mut rng = rand::thread_rng();
        let jitter = capped.mul_f64(JITTER_FACTOR * rng.gen::<f64>());
        if rng.gen_bool(0.5) {
            capped + jitter
        } else {
            capped.saturating_sub(jitter)
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-transient error, or
/// the attempt budget is spent. The last error is returned.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(label, attempt, "upstream call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    "transient upstream failure, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    warn!(label, attempt, error = %err, "upstream call failed, retries exhausted");
                } else {
                    warn!(label, error = %err, "upstream call failed");
                }
                return Err(err);
            }
        }
    }
}
