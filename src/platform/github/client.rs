use octocrab::service::middleware::retry::RetryConfig;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};

use crate::config::GitHubConfig;
use crate::error::FailureCause;
use crate::workflow::types::{ChangeSet, RepoId, Secret};

use super::mapper::failure_cause;

/// Thin wrapper over the GitHub REST endpoints the pipeline needs.
///
/// Tokens are per submission, so an octocrab instance is built for each
/// call sequence rather than held for the process lifetime.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    base_uri: Option<String>,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Self {
        Self {
            base_uri: config.api_base_url.clone(),
        }
    }

    /// Get an octocrab instance authenticated with the submitter's token.
    pub fn session(&self, token: &Secret) -> Result<GitHubSession, FailureCause> {
        // Stages never retry: a resent POST could open a second pull request.
        let mut builder = Octocrab::builder()
            .personal_token(token.expose().to_string())
            .add_retry_config(RetryConfig::None);

        if let Some(ref base_uri) = self.base_uri {
            builder = builder.base_uri(base_uri.as_str()).map_err(|e| {
                FailureCause::Transport(format!("Invalid GitHub API base URI {base_uri}: {e}"))
            })?;
        }

        let client = builder
            .build()
            .map_err(|e| FailureCause::Transport(format!("Failed to build octocrab client: {e}")))?;

        Ok(GitHubSession { client })
    }
}

/// An authenticated client bound to one token.
pub struct GitHubSession {
    client: Octocrab,
}

impl GitHubSession {
    /// Resolve `refs/heads/<branch>`. `None` when the branch does not exist.
    pub async fn find_branch(
        &self,
        repo: &RepoId,
        branch: &str,
    ) -> Result<Option<String>, FailureCause> {
        let url = format!(
            "/repos/{}/git/ref/heads/{}",
            repo.route_segment(),
            encode_ref(branch)
        );

        match self.client.get::<GitRef, _, _>(&url, None::<&()>).await {
            Ok(git_ref) => Ok(Some(git_ref.object.sha)),
            Err(octocrab::Error::GitHub { source, .. }) if source.status_code.as_u16() == 404 => {
                Ok(None)
            }
            Err(e) => Err(failure_cause(e)),
        }
    }

    /// Tree SHA of a commit.
    pub async fn commit_tree(
        &self,
        repo: &RepoId,
        commit_sha: &str,
    ) -> Result<String, FailureCause> {
        let url = format!("/repos/{}/git/commits/{commit_sha}", repo.route_segment());
        let commit: GitCommit = self
            .client
            .get(&url, None::<&()>)
            .await
            .map_err(failure_cause)?;
        Ok(commit.tree.sha)
    }

    /// Create a tree on top of `base_tree` holding every change as an inline blob.
    pub async fn create_tree(
        &self,
        repo: &RepoId,
        base_tree: &str,
        changes: &ChangeSet,
    ) -> Result<String, FailureCause> {
        let url = format!("/repos/{}/git/trees", repo.route_segment());
        let body = NewTree {
            base_tree,
            tree: changes
                .iter()
                .map(|change| TreeEntry {
                    path: &change.path,
                    mode: "100644",
                    kind: "blob",
                    content: &change.content,
                })
                .collect(),
        };

        let tree: CreatedObject = self
            .client
            .post(&url, Some(&body))
            .await
            .map_err(failure_cause)?;
        Ok(tree.sha)
    }

    pub async fn create_commit(
        &self,
        repo: &RepoId,
        message: &str,
        tree: &str,
        parent: &str,
    ) -> Result<String, FailureCause> {
        let url = format!("/repos/{}/git/commits", repo.route_segment());
        let body = NewCommit {
            message,
            tree,
            parents: vec![parent],
        };

        let commit: CreatedObject = self
            .client
            .post(&url, Some(&body))
            .await
            .map_err(failure_cause)?;
        Ok(commit.sha)
    }

    /// Point a new `refs/heads/<branch>` at `sha`.
    pub async fn create_branch(
        &self,
        repo: &RepoId,
        branch: &str,
        sha: &str,
    ) -> Result<(), FailureCause> {
        let url = format!("/repos/{}/git/refs", repo.route_segment());
        let body = NewRef {
            git_ref: format!("refs/heads/{branch}"),
            sha,
        };

        let _: GitRef = self
            .client
            .post(&url, Some(&body))
            .await
            .map_err(failure_cause)?;
        Ok(())
    }

    pub async fn create_pull_request(
        &self,
        repo: &RepoId,
        pr: &NewPullRequest<'_>,
    ) -> Result<CreatedPullRequest, FailureCause> {
        let url = format!("/repos/{}/pulls", repo.route_segment());
        self.client
            .post(&url, Some(pr))
            .await
            .map_err(failure_cause)
    }
}

/// Percent-encode each segment of a branch name, keeping the `/` separators.
fn encode_ref(branch: &str) -> String {
    branch
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

// --- Request types ---

#[derive(Debug, Serialize)]
struct NewTree<'a> {
    base_tree: &'a str,
    tree: Vec<TreeEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct TreeEntry<'a> {
    path: &'a str,
    mode: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct NewCommit<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct NewRef<'a> {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
pub struct NewPullRequest<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub head: &'a str,
    pub base: &'a str,
}

// --- Response types ---

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitCommit {
    tree: GitObject,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatedPullRequest {
    pub number: u64,
    pub html_url: String,
}
