//! GitHub API client implementation

use repolens_core::{ErrorContext, RepolensError, RepolensResult};
use serde::Deserialize;
use tracing::{debug, info};

use super::{create_http_client, handle_response_error, ApiClientConfig, RepositoryMetadata};

/// GitHub API client
pub struct GitHubApiClient {
    client: reqwest::Client,
    config: ApiClientConfig,
}

/// GitHub repository response
#[derive(Debug, Deserialize)]
struct GitHubRepository {
    name: String,
    description: Option<String>,
    default_branch: String,
    size: Option<u64>,
    private: bool,
}

/// GitHub commit response (only the fields we read)
#[derive(Debug, Deserialize)]
struct GitHubCommit {
    sha: String,
}

impl GitHubApiClient {
    /// Create a new GitHub API client
    pub fn new(config: ApiClientConfig) -> RepolensResult<Self> {
        let client = create_http_client(&config)?;
        debug!("Created GitHub API client for {}", config.base_url);
        Ok(Self { client, config })
    }

    /// Create authorization headers
    fn create_auth_headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();

        if let Some(ref token) = self.config.access_token {
            if let Ok(auth_value) =
                reqwest::header::HeaderValue::from_str(&format!("token {}", token))
            {
                headers.insert(reqwest::header::AUTHORIZATION, auth_value);
            }
        }

        if let Ok(accept_value) =
            reqwest::header::HeaderValue::from_str("application/vnd.github.v3+json")
        {
            headers.insert(reqwest::header::ACCEPT, accept_value);
        }

        headers
    }

    /// Make a GET request to the GitHub API
    async fn get_request(
        &self,
        endpoint: &str,
        resource: &str,
        operation: &str,
    ) -> RepolensResult<reqwest::Response> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );

        debug!("Making GitHub API request to: {}", url);

        let response = self
            .client
            .get(&url)
            .headers(self.create_auth_headers())
            .send()
            .await
            .map_err(|e| RepolensError::ServiceUnavailable {
                message: format!("Failed to reach the GitHub API: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("github_api_client")
                    .with_operation(operation)
                    .with_suggestion("Check network connectivity and GitHub status"),
            })?;

        if !response.status().is_success() {
            return Err(handle_response_error(response, operation, resource).await);
        }

        Ok(response)
    }

    /// Fetch repository metadata, including the default branch.
    pub async fn get_repository_metadata(
        &self,
        owner: &str,
        repo: &str,
    ) -> RepolensResult<RepositoryMetadata> {
        info!("Fetching GitHub repository metadata for {}/{}", owner, repo);

        let endpoint = format!("repos/{}/{}", owner, repo);
        let resource = format!("repository {}/{}", owner, repo);
        let response = self
            .get_request(&endpoint, &resource, "get_repository_metadata")
            .await?;

        let github_repo: GitHubRepository =
            response
                .json()
                .await
                .map_err(|e| RepolensError::Repository {
                    message: format!("Failed to parse repository metadata: {}", e),
                    source: Some(Box::new(e)),
                    context: ErrorContext::new("github_api_client")
                        .with_operation("get_repository_metadata"),
                })?;

        Ok(RepositoryMetadata {
            name: github_repo.name,
            description: github_repo.description,
            default_branch: github_repo.default_branch,
            size_kb: github_repo.size,
            private: github_repo.private,
        })
    }

    /// Resolve a branch name to the sha of its head commit.
    pub async fn resolve_commit(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> RepolensResult<String> {
        debug!(
            "Resolving commit for {}/{} (branch: {})",
            owner, repo, branch
        );

        let endpoint = format!("repos/{}/{}/commits/{}", owner, repo, branch);
        let resource = format!("branch {} of {}/{}", branch, owner, repo);
        let response = self
            .get_request(&endpoint, &resource, "resolve_commit")
            .await?;

        let commit: GitHubCommit =
            response
                .json()
                .await
                .map_err(|e| RepolensError::Repository {
                    message: format!("Failed to parse commit response: {}", e),
                    source: Some(Box::new(e)),
                    context: ErrorContext::new("github_api_client").with_operation("resolve_commit"),
                })?;

        Ok(commit.sha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation_succeeds() {
        let config = ApiClientConfig::github(None);
        assert!(GitHubApiClient::new(config).is_ok());
    }

    #[test]
    fn auth_headers_include_token_when_configured() {
        let client =
            GitHubApiClient::new(ApiClientConfig::github(Some("secret".to_string()))).unwrap();
        let headers = client.create_auth_headers();
        assert_eq!(
            headers.get(reqwest::header::AUTHORIZATION).unwrap(),
            "token secret"
        );
        assert!(headers.get(reqwest::header::ACCEPT).is_some());
    }

    #[test]
    fn auth_headers_without_token() {
        let client = GitHubApiClient::new(ApiClientConfig::github(None)).unwrap();
        let headers = client.create_auth_headers();
        assert!(headers.get(reqwest::header::AUTHORIZATION).is_none());
    }

    #[test]
    fn repository_response_parsing() {
        let body = r#"{
            "name": "widgets",
            "description": "A widget factory",
            "default_branch": "main",
            "size": 2048,
            "private": false,
            "topics": ["rust"]
        }"#;
        let repo: GitHubRepository = serde_json::from_str(body).unwrap();
        assert_eq!(repo.name, "widgets");
        assert_eq!(repo.default_branch, "main");
        assert_eq!(repo.size, Some(2048));
        assert!(!repo.private);
    }

    #[test]
    fn commit_response_parsing() {
        let body = r#"{"sha": "abc123def", "commit": {"message": "init"}}"#;
        let commit: GitHubCommit = serde_json::from_str(body).unwrap();
        assert_eq!(commit.sha, "abc123def");
    }
}
