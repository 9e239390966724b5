//! Retry with exponential backoff for read-only RPC queries
//!
//! Only [`BridgeError::Network`] is retried. Everything else is returned on
//! the first failure.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::error::BridgeError;

/// Backoff configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Calculate backoff duration for a given attempt (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts.max(1)
    }
}

/// Run `f` until it succeeds, fails with a non-retryable error, or the
/// attempts are used up
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    f: F,
) -> Result<T, BridgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BridgeError>>,
{
    with_retry_until(config, operation, None, f).await
}

/// Like [`with_retry`], but never sleeps past `deadline`
///
/// Once the deadline has passed the last error is returned instead of
/// scheduling another attempt.
pub async fn with_retry_until<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    deadline: Option<Instant>,
    mut f: F,
) -> Result<T, BridgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BridgeError>>,
{
    let mut attempts = 0u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempts += 1;
                if !e.is_retryable() || !config.should_retry(attempts) {
                    return Err(e);
                }
                let mut backoff = config.backoff_for_attempt(attempts - 1);
                if let Some(deadline) = deadline {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(e);
                    }
                    backoff = backoff.min(remaining);
                }
                warn!(
                    operation = operation,
                    attempt = attempts,
                    max_attempts = config.max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Transient error, retrying"
                );
                tokio::time::sleep(backoff).await;
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            multiplier: 2.0,
        };
        assert_eq!(config.backoff_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_millis(350));
        assert_eq!(config.backoff_for_attempt(8), Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&RetryConfig::default(), "balance", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(BridgeError::Network("connection reset".into()))
                } else {
                    Ok(7u64)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&RetryConfig::default(), "balance", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BridgeError::Network("503".into())) }
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), "network");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_network_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&RetryConfig::default(), "submit", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BridgeError::Submission("execution reverted".into())) }
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), "submission");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cuts_backoff_short() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let deadline = start + Duration::from_millis(1500);
        let config = RetryConfig {
            max_attempts: 10,
            ..RetryConfig::default()
        };
        let result: Result<(), _> =
            with_retry_until(&config, "status", Some(deadline), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BridgeError::Network("connection refused".into())) }
            })
            .await;
        assert_eq!(result.unwrap_err().kind(), "network");
        // 1s backoff, then 0.5s clipped to the deadline
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1500));
        assert!(elapsed < Duration::from_millis(1510));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_does_not_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            with_retry_until(&RetryConfig::default(), "status", Some(Instant::now()), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BridgeError::Network("503".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
