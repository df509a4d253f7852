//! Repository URL validation and normalization

use repolens_core::{ErrorContext, RepolensError, RepolensResult};
use url::Url;

/// A validated reference to a remote repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    /// Canonical https form without the `.git` suffix
    pub normalized_url: String,
}

/// Validate and normalize a repository URL.
///
/// Accepts `https://github.com/owner/repo`, the same with a `.git` suffix,
/// and the scp-like `git@github.com:owner/repo(.git)?` form. Anything
/// without at least owner and repository path segments is rejected.
pub fn validate_url(input: &str) -> RepolensResult<RepoRef> {
    let input = input.trim();
    if input.is_empty() {
        return Err(invalid_url("repository URL is empty"));
    }

    let (host, path) = if let Some(rest) = input.strip_prefix("git@") {
        // scp-like syntax: git@host:owner/repo(.git)?
        let (host, path) = rest
            .split_once(':')
            .ok_or_else(|| invalid_url("malformed git@ URL"))?;
        (host.to_string(), path.to_string())
    } else {
        let parsed = Url::parse(input).map_err(|e| {
            RepolensError::Validation {
                message: format!("Invalid repository URL: {}", e),
                field: Some("repository_url".to_string()),
                context: ErrorContext::new("repo_url")
                    .with_operation("validate_url")
                    .with_suggestion("Use the form https://github.com/owner/repo"),
            }
        })?;
        let host = parsed
            .host_str()
            .ok_or_else(|| invalid_url("repository URL has no host"))?
            .to_string();
        (host, parsed.path().trim_start_matches('/').to_string())
    };

    if !host.eq_ignore_ascii_case("github.com") {
        return Err(invalid_url(&format!(
            "unsupported repository host: {}",
            host
        )));
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return Err(invalid_url(
            "repository URL must contain owner and repository name",
        ));
    }

    let owner = segments[0].to_string();
    let name = segments[1].trim_end_matches(".git").to_string();
    if owner.is_empty() || name.is_empty() {
        return Err(invalid_url("owner and repository name must be non-empty"));
    }

    Ok(RepoRef {
        normalized_url: format!("https://github.com/{}/{}", owner, name),
        owner,
        name,
    })
}

fn invalid_url(message: &str) -> RepolensError {
    RepolensError::Validation {
        message: message.to_string(),
        field: Some("repository_url".to_string()),
        context: ErrorContext::new("repo_url")
            .with_operation("validate_url")
            .with_suggestion("Use the form https://github.com/owner/repo"),
    }
}
