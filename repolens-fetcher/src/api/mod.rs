//! REST clients for remote repository hosts
//!
//! Only GitHub is supported; the per-request timeout is fixed here and
//! request-level retries are deliberately disabled (retry happens at the
//! job level).

use repolens_core::{ErrorContext, RepolensError, RepolensResult};
use serde::{Deserialize, Serialize};

pub mod github;

pub use github::GitHubApiClient;

/// Repository metadata as reported by the remote host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    /// Repository name
    pub name: String,
    /// Repository description
    pub description: Option<String>,
    /// Default branch name
    pub default_branch: String,
    /// Repository size in KB
    pub size_kb: Option<u64>,
    /// Whether the repository is private
    pub private: bool,
}

/// Configuration for API clients
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Access token for authentication
    pub access_token: Option<String>,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            access_token: None,
            timeout_seconds: 30,
            user_agent: "repolens/0.1".to_string(),
        }
    }
}

impl ApiClientConfig {
    /// Create a new configuration for GitHub
    pub fn github(access_token: Option<String>) -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            access_token,
            ..Default::default()
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

/// Helper function to create the HTTP client with common configuration
pub(crate) fn create_http_client(config: &ApiClientConfig) -> RepolensResult<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();

    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_str(&config.user_agent).map_err(|e| {
            RepolensError::Repository {
                message: format!("Invalid user agent: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_client").with_operation("create_client"),
            }
        })?,
    );

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_seconds))
        .default_headers(headers)
        .build()
        .map_err(|e| RepolensError::Repository {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_client").with_operation("create_client"),
        })?;

    Ok(client)
}

/// Map an unsuccessful remote response to the error taxonomy.
///
/// 404 is a missing repository; 403 is the remote rate limit; everything
/// else (including transport failures upstream of this call) is upstream
/// unavailability.
pub(crate) async fn handle_response_error(
    response: reqwest::Response,
    operation: &str,
    resource: &str,
) -> RepolensError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match status.as_u16() {
        404 => RepolensError::NotFound {
            resource: resource.to_string(),
            context: ErrorContext::new("github_api_client")
                .with_operation(operation)
                .with_suggestion("Check the repository owner and name")
                .with_suggestion("Private repositories require GITHUB_TOKEN"),
        },
        403 => RepolensError::ServiceUnavailable {
            message: format!("GitHub API rate limit exceeded for {}", resource),
            source: None,
            context: ErrorContext::new("github_api_client")
                .with_operation(operation)
                .with_metadata("status", "403")
                .with_suggestion("Provide GITHUB_TOKEN to raise the rate limit")
                .with_suggestion("Retry after the rate-limit window resets"),
        },
        _ => RepolensError::ServiceUnavailable {
            message: format!(
                "GitHub API returned {} for {}: {}",
                status.as_u16(),
                resource,
                if body.is_empty() {
                    status.canonical_reason().unwrap_or("unknown error")
                } else {
                    &body
                }
            ),
            source: None,
            context: ErrorContext::new("github_api_client")
                .with_operation(operation)
                .with_metadata("status", status.as_str()),
        },
    }
}
