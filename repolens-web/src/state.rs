//! Application state
//!
//! The explicit services record built once at startup and threaded into
//! every handler and middleware.

use crate::error::ApiError;
use repolens_core::{
    RepolensConfig, RepolensError, STRICT_RATE_LIMIT_MAX_REQUESTS, STRICT_RATE_LIMIT_WINDOW_MS,
};
use repolens_engine::AnalysisService;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Fixed-window request counter per client IP
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    hits: Mutex<HashMap<IpAddr, (Instant, u32)>>,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Count one request; when over budget returns the remaining window in
    /// milliseconds.
    pub async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;

        // Opportunistic cleanup keeps the map bounded by active clients
        hits.retain(|_, (start, _)| now.duration_since(*start) < self.window);

        let entry = hits.entry(ip).or_insert((now, 0));
        if now.duration_since(entry.0) >= self.window {
            *entry = (now, 0);
        }
        entry.1 += 1;

        if entry.1 > self.max_requests {
            let elapsed = now.duration_since(entry.0);
            let remaining = self.window.saturating_sub(elapsed);
            Err(remaining.as_millis() as u64)
        } else {
            Ok(())
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RepolensConfig>,
    pub service: Arc<AnalysisService>,
    pub global_limiter: Arc<FixedWindowLimiter>,
    pub strict_limiter: Arc<FixedWindowLimiter>,
}

impl AppState {
    pub fn new(config: RepolensConfig, service: Arc<AnalysisService>) -> Self {
        let global_limiter = Arc::new(FixedWindowLimiter::new(
            config.rate_limit_max_requests,
            Duration::from_millis(config.rate_limit_window_ms),
        ));
        let strict_limiter = Arc::new(FixedWindowLimiter::new(
            STRICT_RATE_LIMIT_MAX_REQUESTS,
            Duration::from_millis(STRICT_RATE_LIMIT_WINDOW_MS),
        ));

        Self {
            config: Arc::new(config),
            service,
            global_limiter,
            strict_limiter,
        }
    }

    /// Map a domain error to the boundary envelope for this deployment.
    pub fn api_error(&self, err: RepolensError) -> ApiError {
        ApiError::from_domain(err, self.config.environment.is_production())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limiter_allows_up_to_budget_then_rejects() {
        let limiter = FixedWindowLimiter::new(3, Duration::from_secs(60));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();

        for _ in 0..3 {
            assert!(limiter.check(ip).await.is_ok());
        }
        let retry_after = limiter.check(ip).await.unwrap_err();
        assert!(retry_after <= 60_000);
    }

    #[tokio::test]
    async fn limiter_windows_are_per_ip() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_secs(60));
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check(a).await.is_ok());
        assert!(limiter.check(b).await.is_ok());
        assert!(limiter.check(a).await.is_err());
    }

    #[tokio::test]
    async fn limiter_resets_after_the_window() {
        tokio::time::pause();
        let limiter = FixedWindowLimiter::new(1, Duration::from_millis(100));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();

        assert!(limiter.check(ip).await.is_ok());
        assert!(limiter.check(ip).await.is_err());

        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(limiter.check(ip).await.is_ok());
    }
}
