//! Working-copy materialization
//!
//! Shallow, single-branch clones into unique per-job directories. A failed
//! clone always removes its partial directory; disposal is idempotent.

use chrono::{DateTime, Utc};
use repolens_core::{ErrorContext, RepolensError, RepolensResult};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

/// Options for materializing a working copy
#[derive(Debug, Clone)]
pub struct CloneOptions {
    /// Branch to clone; the remote default when None
    pub branch: Option<String>,
    /// Clone depth; the pipeline only needs a tree snapshot
    pub depth: u32,
    pub single_branch: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            branch: None,
            depth: 1,
            single_branch: true,
        }
    }
}

/// A materialized working copy
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    pub local_path: PathBuf,
    pub commit_sha: String,
    pub branch: String,
    pub cloned_at: DateTime<Utc>,
}

/// Materializes and reclaims working copies under a base directory
#[derive(Debug, Clone)]
pub struct RepositoryMaterializer {
    base_path: PathBuf,
    access_token: Option<String>,
}

impl RepositoryMaterializer {
    pub fn new(base_path: impl Into<PathBuf>, access_token: Option<String>) -> Self {
        Self {
            base_path: base_path.into(),
            access_token,
        }
    }

    /// Clone `url` into a fresh unique directory.
    pub async fn clone_repository(
        &self,
        url: &str,
        options: &CloneOptions,
    ) -> RepolensResult<WorkingCopy> {
        let target_path = self
            .base_path
            .join(uuid::Uuid::new_v4().simple().to_string());

        info!(
            repo_url = %url,
            target_path = %target_path.display(),
            "Starting repository clone"
        );

        tokio::fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| RepolensError::Repository {
                message: format!("Failed to create clone base directory: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("materializer").with_operation("clone_repository"),
            })?;

        match self.run_clone(url, &target_path, options).await {
            Ok(copy) => Ok(copy),
            Err(e) => {
                // Never leave a partial directory behind
                if let Err(cleanup_err) = tokio::fs::remove_dir_all(&target_path).await {
                    if cleanup_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            target_path = %target_path.display(),
                            error = %cleanup_err,
                            "Failed to remove partial clone directory"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn run_clone(
        &self,
        url: &str,
        target_path: &Path,
        options: &CloneOptions,
    ) -> RepolensResult<WorkingCopy> {
        let mut cmd = Command::new("git");
        cmd.arg("clone");
        cmd.arg("--depth").arg(options.depth.to_string());
        if options.single_branch {
            cmd.arg("--single-branch");
        }
        if let Some(branch) = &options.branch {
            cmd.arg("--branch").arg(branch);
        }

        let clone_url = self.prepare_authenticated_url(url)?;
        cmd.arg(&clone_url).arg(target_path);

        let output = cmd.output().await.map_err(|e| RepolensError::Repository {
            message: format!("Failed to execute git clone: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("materializer")
                .with_operation("clone_repository")
                .with_suggestion("Ensure git is installed and accessible"),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RepolensError::Repository {
                message: format!("Git clone failed: {}", stderr.trim()),
                source: None,
                context: ErrorContext::new("materializer")
                    .with_operation("clone_repository")
                    .with_suggestion("Check repository URL and access permissions"),
            });
        }

        let commit_sha = self.git_stdout(target_path, &["rev-parse", "HEAD"]).await?;
        let branch = match &options.branch {
            Some(branch) => branch.clone(),
            None => {
                self.git_stdout(target_path, &["rev-parse", "--abbrev-ref", "HEAD"])
                    .await?
            }
        };

        info!(
            repo_url = %url,
            commit_sha = %commit_sha,
            branch = %branch,
            "Repository cloned successfully"
        );

        Ok(WorkingCopy {
            local_path: target_path.to_path_buf(),
            commit_sha,
            branch,
            cloned_at: Utc::now(),
        })
    }

    async fn git_stdout(&self, repo_path: &Path, args: &[&str]) -> RepolensResult<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(repo_path)
            .args(args)
            .output()
            .await
            .map_err(|e| RepolensError::Repository {
                message: format!("Failed to execute git {}: {}", args.join(" "), e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("materializer").with_operation("git_stdout"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RepolensError::Repository {
                message: format!("git {} failed: {}", args.join(" "), stderr.trim()),
                source: None,
                context: ErrorContext::new("materializer").with_operation("git_stdout"),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Remove a working copy. Missing directories are not an error.
    pub async fn dispose(&self, local_path: &Path) -> RepolensResult<()> {
        match tokio::fs::remove_dir_all(local_path).await {
            Ok(()) => {
                debug!(path = %local_path.display(), "Working copy removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RepolensError::Repository {
                message: format!("Failed to remove working copy: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("materializer")
                    .with_operation("dispose")
                    .with_metadata("path", &local_path.display().to_string()),
            }),
        }
    }

    /// Embed the access token in the clone URL for private repositories.
    fn prepare_authenticated_url(&self, url: &str) -> RepolensResult<String> {
        let Some(token) = &self.access_token else {
            return Ok(url.to_string());
        };

        let parsed = Url::parse(url).map_err(|e| RepolensError::Repository {
            message: format!("Invalid repository URL: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("materializer").with_operation("prepare_authenticated_url"),
        })?;

        let host = parsed
            .host_str()
            .ok_or_else(|| RepolensError::Repository {
                message: "Repository URL has no host".to_string(),
                source: None,
                context: ErrorContext::new("materializer")
                    .with_operation("prepare_authenticated_url"),
            })?;

        Ok(format!("https://{}@{}{}", token, host, parsed.path()))
    }
}
