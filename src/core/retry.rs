//! Exponential backoff for transient gateway failures

use crate::config::RetryConfig;
use crate::domain::Result;
use crate::log_retry_attempt;
use std::future::Future;
use std::time::Duration;

/// Retry policy applied to individual gateway operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay_ms: u64,
    max_delay_ms: u64,
    multiplier: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1) as u32,
            initial_delay_ms: config.initial_delay_ms,
            max_delay_ms: config.max_delay_ms,
            multiplier: config.backoff_multiplier,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = delay.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Runs `operation` until it succeeds, fails permanently, or attempts run out
    ///
    /// Returns the final result together with the number of attempts made.
    pub async fn run<F, Fut, T>(&self, name: &str, operation: F) -> (Result<T>, u32)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    log_retry_attempt!(
                        name,
                        attempt,
                        self.max_attempts,
                        delay.as_millis() as u64,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }

    /// Like [`run`](Self::run) without the attempt count
    pub async fn call<F, Fut, T>(&self, name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(name, operation).await.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GatewayError, TabliftError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy::from_config(&RetryConfig {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        })
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_retries: 6,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        });
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = fast_policy(3)
            .run("op", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(GatewayError::Timeout("slow".to_string()).into())
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = fast_policy(5)
            .run("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TabliftError::Gateway(GatewayError::Rejected {
                    status: 400,
                    message: "bad".to_string(),
                }))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let (result, attempts) = fast_policy(3)
            .run("op", || async {
                Err::<(), _>(GatewayError::RateLimited("slow down".to_string()).into())
            })
            .await;
        assert!(matches!(
            result,
            Err(TabliftError::Gateway(GatewayError::RateLimited(_)))
        ));
        assert_eq!(attempts, 3);
    }
}
