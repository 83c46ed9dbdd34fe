//! Retry with exponential backoff
//!
//! Adapters use this around connection setup, before any chunk has been
//! handed to the orchestration layer. Once a stream is flowing, a failure is
//! surfaced instead of replayed, because the caller may already have seen
//! part of the turn.
//!
//! # Examples
//!
//! ```rust,no_run
//! use agent_orchestra::retry::{retry_with_backoff_conditional, RetryConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RetryConfig::default()
//!     .with_max_attempts(3)
//!     .with_initial_delay(Duration::from_millis(250));
//!
//! let answer = retry_with_backoff_conditional(config, || async {
//!     Ok::<_, agent_orchestra::Error>(42)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff settings
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,
    /// Fraction of the delay randomised, 0.0 to 1.0
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single attempt, never retried
    pub fn disabled() -> Self {
        Self::default().with_max_attempts(1)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let capped = (base_ms * self.backoff_multiplier.powi(attempt as i32))
            .min(self.max_delay.as_millis() as f64);

        let jitter_range = capped * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range;
        Duration::from_millis((capped + jitter - jitter_range / 2.0).max(0.0) as u64)
    }
}

/// Retries every failure until attempts run out.
pub async fn retry_with_backoff<F, Fut, T>(config: RetryConfig, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(config, |_| true, operation).await
}

/// Retries only failures where [`Error::is_retryable`] holds; anything else
/// is returned at once.
pub async fn retry_with_backoff_conditional<F, Fut, T>(
    config: RetryConfig,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(config, Error::is_retryable, operation).await
}

async fn retry_when<F, Fut, T, P>(config: RetryConfig, should_retry: P, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&Error) -> bool,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= attempts || !should_retry(&err) {
                    return Err(err);
                }

                let delay = config.delay_for(attempt - 1);
                log::warn!(
                    "attempt {}/{} failed: {}; retrying in {:?}",
                    attempt,
                    attempts,
                    err,
                    delay
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(5))
            .with_jitter_factor(0.0)
    }

    #[test]
    fn test_config_builder() {
        let config = RetryConfig::new()
            .with_max_attempts(5)
            .with_initial_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(30))
            .with_backoff_multiplier(1.5)
            .with_jitter_factor(0.2);

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.backoff_multiplier, 1.5);
        assert_eq!(config.jitter_factor, 0.2);
        assert_eq!(RetryConfig::disabled().max_attempts, 1);
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(3))
            .with_jitter_factor(0.0);

        assert_eq!(config.delay_for(0), Duration::from_secs(1));
        assert_eq!(config.delay_for(1), Duration::from_secs(2));
        assert_eq!(config.delay_for(5), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result = retry_with_backoff(fast(), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(Error::timeout())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result = retry_with_backoff(fast().with_max_attempts(2), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(Error::timeout()) }
        })
        .await;

        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_conditional_stops_on_client_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result = retry_with_backoff_conditional(fast(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(Error::api("API error 401 Unauthorized: bad key")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_conditional_retries_server_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _ = retry_with_backoff_conditional(fast(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(Error::api("API error 503 Service Unavailable: busy")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
