//! Environment-driven configuration
//!
//! All configuration is stringly-typed from the process environment; empty
//! or missing values fall back to documented defaults. `DATABASE_URL` is
//! the only required key.

use crate::error::{ErrorContext, RepolensError, RepolensResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "development" => Ok(Environment::Development),
            "production" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            _ => Err(()),
        }
    }
}

/// Process-wide configuration, built once at startup
#[derive(Debug, Clone)]
pub struct RepolensConfig {
    /// HTTP listen port
    pub port: u16,
    /// API path version segment
    pub api_version: String,
    pub environment: Environment,
    /// Relational store connection string (required)
    pub database_url: String,
    /// Worker pool size
    pub queue_concurrency: usize,
    /// Overall per-job timeout
    pub job_timeout_ms: u64,
    /// Optional token for the GitHub REST API and authenticated clones
    pub github_token: Option<String>,
    /// Base directory for per-job working copies
    pub clone_base_path: String,
    /// Repositories above this size are rejected before cloning
    pub max_repo_size_mb: u64,
    /// Default per-file size cutoff for the tree walker
    pub max_file_size_kb: u32,
    /// Default for AnalysisOptions.include_tests
    pub include_tests: bool,
    /// Global rate-limit window
    pub rate_limit_window_ms: u64,
    /// Global rate-limit budget per client IP per window
    pub rate_limit_max_requests: u32,
    /// Allowed CORS origin; "*" when unset
    pub cors_origin: Option<String>,
    pub cors_credentials: bool,
    /// When set, every request must present `x-api-key`
    pub api_key: Option<String>,
}

/// Strict limiter applied to analysis intake: 10 requests per hour per IP.
pub const STRICT_RATE_LIMIT_MAX_REQUESTS: u32 = 10;
pub const STRICT_RATE_LIMIT_WINDOW_MS: u64 = 60 * 60 * 1000;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl RepolensConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> RepolensResult<Self> {
        let database_url = env_opt("DATABASE_URL").ok_or_else(|| RepolensError::Config {
            message: "DATABASE_URL is required".to_string(),
            source: None,
            context: ErrorContext::new("config")
                .with_operation("from_env")
                .with_suggestion("Set DATABASE_URL, e.g. sqlite:./data/repolens.db"),
        })?;

        let environment = env_opt("APP_ENV")
            .and_then(|v| v.parse().ok())
            .unwrap_or(Environment::Development);

        let config = Self {
            port: env_or("PORT", 3001),
            api_version: env_opt("API_VERSION").unwrap_or_else(|| "v1".to_string()),
            environment,
            database_url,
            queue_concurrency: env_or("QUEUE_CONCURRENCY", 5),
            job_timeout_ms: env_or("JOB_TIMEOUT_MS", 600_000),
            github_token: env_opt("GITHUB_TOKEN"),
            clone_base_path: env_opt("CLONE_BASE_PATH")
                .unwrap_or_else(|| "/tmp/repolens-repos".to_string()),
            max_repo_size_mb: env_or("MAX_REPO_SIZE_MB", 500),
            max_file_size_kb: env_or("MAX_FILE_SIZE_KB", 1000),
            include_tests: env_or("INCLUDE_TESTS", true),
            rate_limit_window_ms: env_or("RATE_LIMIT_WINDOW_MS", 15 * 60 * 1000),
            rate_limit_max_requests: env_or("RATE_LIMIT_MAX_REQUESTS", 100),
            cors_origin: env_opt("CORS_ORIGIN"),
            cors_credentials: env_or("CORS_CREDENTIALS", false),
            api_key: env_opt("API_KEY"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration ranges.
    pub fn validate(&self) -> RepolensResult<()> {
        if self.queue_concurrency == 0 {
            return Err(RepolensError::Config {
                message: "QUEUE_CONCURRENCY must be greater than 0".to_string(),
                source: None,
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        if !(1..=10_000).contains(&self.max_file_size_kb) {
            return Err(RepolensError::Config {
                message: format!(
                    "MAX_FILE_SIZE_KB must be between 1 and 10000, got {}",
                    self.max_file_size_kb
                ),
                source: None,
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        if self.job_timeout_ms == 0 {
            return Err(RepolensError::Config {
                message: "JOB_TIMEOUT_MS must be greater than 0".to_string(),
                source: None,
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        Ok(())
    }

    /// Whether the API key check is enforced for this configuration.
    pub fn auth_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for RepolensConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            api_version: "v1".to_string(),
            environment: Environment::Development,
            database_url: "sqlite::memory:".to_string(),
            queue_concurrency: 5,
            job_timeout_ms: 600_000,
            github_token: None,
            clone_base_path: "/tmp/repolens-repos".to_string(),
            max_repo_size_mb: 500,
            max_file_size_kb: 1000,
            include_tests: true,
            rate_limit_window_ms: 15 * 60 * 1000,
            rate_limit_max_requests: 100,
            cors_origin: None,
            cors_credentials: false,
            api_key: None,
        }
    }
}
