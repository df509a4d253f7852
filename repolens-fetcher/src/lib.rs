//! RepoLens Fetcher - Remote repository access
//!
//! Validates repository URLs, talks to the GitHub REST API for metadata and
//! commit resolution, and materializes shallow working copies that are
//! reclaimed when a job finishes.

pub mod api;
pub mod clone;
pub mod repo_url;

pub use api::{ApiClientConfig, GitHubApiClient, RepositoryMetadata};
pub use clone::{CloneOptions, RepositoryMaterializer, WorkingCopy};
pub use repo_url::{validate_url, RepoRef};

use repolens_core::{async_trait, RepolensResult};

/// Seam between the pipeline worker and the remote host.
///
/// The production implementation is [`GitHubFetcher`]; tests substitute a
/// fixture-backed stub.
#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    /// Fetch repository metadata (default branch, size, visibility).
    async fn fetch_metadata(&self, owner: &str, name: &str) -> RepolensResult<RepositoryMetadata>;

    /// Resolve a branch name to a commit sha.
    async fn resolve_commit(&self, owner: &str, name: &str, branch: &str)
        -> RepolensResult<String>;

    /// Materialize a shallow working copy of the repository.
    async fn materialize(&self, url: &str, branch: &str) -> RepolensResult<WorkingCopy>;

    /// Reclaim a working copy. Must be idempotent.
    async fn dispose(&self, copy: &WorkingCopy) -> RepolensResult<()>;
}

/// GitHub-backed fetcher combining the REST client and the git materializer.
pub struct GitHubFetcher {
    client: GitHubApiClient,
    materializer: RepositoryMaterializer,
}

impl GitHubFetcher {
    pub fn new(base_path: impl Into<std::path::PathBuf>, token: Option<String>) -> RepolensResult<Self> {
        let config = ApiClientConfig::github(token.clone());
        let client = GitHubApiClient::new(config)?;
        let materializer = RepositoryMaterializer::new(base_path, token);
        Ok(Self {
            client,
            materializer,
        })
    }
}

#[async_trait]
impl RepositoryFetcher for GitHubFetcher {
    async fn fetch_metadata(&self, owner: &str, name: &str) -> RepolensResult<RepositoryMetadata> {
        self.client.get_repository_metadata(owner, name).await
    }

    async fn resolve_commit(
        &self,
        owner: &str,
        name: &str,
        branch: &str,
    ) -> RepolensResult<String> {
        self.client.resolve_commit(owner, name, branch).await
    }

    async fn materialize(&self, url: &str, branch: &str) -> RepolensResult<WorkingCopy> {
        let options = CloneOptions {
            branch: Some(branch.to_string()),
            ..Default::default()
        };
        self.materializer.clone_repository(url, &options).await
    }

    async fn dispose(&self, copy: &WorkingCopy) -> RepolensResult<()> {
        self.materializer.dispose(&copy.local_path).await
    }
}
