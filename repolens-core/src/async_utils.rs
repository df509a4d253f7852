//! Async utilities and patterns
//!
//! Retry scheduling, timeouts and bounded-concurrency fan-out shared by the
//! queue and the pipeline worker.

use crate::error::{ErrorContext, RepolensError, RepolensResult};
use tokio::time::{timeout, Duration};

/// Retry configuration for job attempts
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Initial delay between attempts in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay between attempts in milliseconds
    pub max_delay_ms: u64,
    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 2000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay before the given attempt number (1-based; attempt 1 has no delay).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(31);
        let mut delay_ms = (self.initial_delay_ms as f64
            * self.backoff_multiplier.powi(exponent as i32)) as u64;
        delay_ms = delay_ms.min(self.max_delay_ms);
        if self.jitter {
            let jitter_factor = 0.1;
            let jitter = (fastrand::f64() - 0.5) * 2.0 * jitter_factor;
            delay_ms = ((delay_ms as f64) * (1.0 + jitter)) as u64;
        }
        Duration::from_millis(delay_ms)
    }
}

/// Timeout wrapper for async operations
pub async fn with_timeout<F, T>(
    future: F,
    timeout_ms: u64,
    operation_name: &str,
) -> RepolensResult<T>
where
    F: std::future::Future<Output = T>,
{
    match timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(RepolensError::Timeout {
            operation: operation_name.to_string(),
            duration_ms: timeout_ms,
            context: ErrorContext::new("async_utils")
                .with_operation("timeout")
                .with_metadata("timeout_ms", &timeout_ms.to_string())
                .with_suggestion("Increase timeout duration")
                .with_suggestion("Check network connectivity"),
        }),
    }
}

/// Concurrent processing with controlled parallelism
pub async fn process_concurrently<T, R, F, Fut>(
    items: Vec<T>,
    max_concurrent: usize,
    processor: F,
) -> Vec<RepolensResult<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + Clone + 'static,
    Fut: std::future::Future<Output = RepolensResult<R>> + Send + 'static,
{
    use futures::stream::{self, StreamExt};

    stream::iter(items)
        .map(|item| {
            let processor = processor.clone();
            tokio::spawn(async move { processor(item).await })
        })
        .buffered(max_concurrent.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .map(|join_result| match join_result {
            Ok(result) => result,
            Err(join_error) => Err(RepolensError::Internal {
                message: format!("Task join error: {}", join_error),
                source: Some(Box::new(join_error)),
                context: ErrorContext::new("async_utils")
                    .with_operation("process_concurrently")
                    .with_suggestion("Check for panics in concurrent tasks"),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delays_grow_exponentially() {
        let config = RetryConfig {
            jitter: false,
            ..Default::default()
        };
        assert_eq!(config.delay_for(1), Duration::ZERO);
        assert_eq!(config.delay_for(2), Duration::from_millis(2000));
        assert_eq!(config.delay_for(3), Duration::from_millis(4000));
    }

    #[test]
    fn backoff_is_capped() {
        let config = RetryConfig {
            jitter: false,
            max_delay_ms: 5000,
            ..Default::default()
        };
        assert_eq!(config.delay_for(10), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn timeout_produces_timeout_error() {
        let result = with_timeout(
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
            },
            5,
            "slow_op",
        )
        .await;

        match result {
            Err(RepolensError::Timeout { operation, .. }) => assert_eq!(operation, "slow_op"),
            other => panic!("expected timeout, got {:?}", other.is_ok()),
        }
    }

    #[tokio::test]
    async fn bounded_fan_out_preserves_order() {
        let items = vec![1u32, 2, 3, 4, 5];
        let results = process_concurrently(items, 2, |n| async move { Ok(n * 2) }).await;
        let doubled: Vec<u32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(doubled, vec![2, 4, 6, 8, 10]);
    }
}
