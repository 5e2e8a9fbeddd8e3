use async_trait::async_trait;

use crate::error::{FailureCause, StageError, StageResult};
use crate::platform::types::{BranchCommit, MutateRequest};
use crate::platform::StageAdapter;
use crate::workflow::types::Stage;

use super::client::GitHubClient;
use super::mapper::is_already_exists;

/// Commits a change set onto a new branch through the GitHub git data API.
///
/// The new branch ref is created last, so a failure before that point
/// leaves only unreferenced objects behind.
pub struct BranchMutator {
    github: GitHubClient,
}

impl BranchMutator {
    pub fn new(github: GitHubClient) -> Self {
        Self { github }
    }

    async fn apply(&self, request: &MutateRequest) -> Result<BranchCommit, FailureCause> {
        for change in &request.changes {
            validate_repo_path(&change.path)?;
        }

        let session = self.github.session(&request.access_token)?;
        let repo = &request.repository;

        if session.find_branch(repo, &request.new_branch).await?.is_some() {
            return Err(FailureCause::BranchExists(request.new_branch.clone()));
        }

        let base_sha = session
            .find_branch(repo, &request.source_branch)
            .await?
            .ok_or_else(|| FailureCause::Rejected {
                status: 404,
                message: format!("source branch {} not found", request.source_branch),
            })?;

        let base_tree = session.commit_tree(repo, &base_sha).await?;
        tracing::debug!(repo = %repo, base = %base_sha, "Resolved source branch");

        let tree = session
            .create_tree(repo, &base_tree, &request.changes)
            .await?;
        let commit_sha = session
            .create_commit(repo, &request.commit_message, &tree, &base_sha)
            .await?;
        tracing::debug!(repo = %repo, commit = %commit_sha, "Created commit");

        session
            .create_branch(repo, &request.new_branch, &commit_sha)
            .await
            .map_err(|cause| {
                if is_already_exists(&cause) {
                    FailureCause::BranchExists(request.new_branch.clone())
                } else {
                    cause
                }
            })?;

        Ok(BranchCommit {
            branch: request.new_branch.clone(),
            commit_sha,
        })
    }
}

#[async_trait]
impl StageAdapter for BranchMutator {
    type Request = MutateRequest;
    type Payload = BranchCommit;

    async fn execute(&self, request: MutateRequest) -> StageResult<BranchCommit> {
        self.apply(&request)
            .await
            .map_err(|cause| StageError::new(Stage::Mutate, cause))
    }
}

/// Reject paths that would land outside the repository working tree.
pub fn validate_repo_path(path: &str) -> Result<(), FailureCause> {
    let invalid = |reason: &str| -> Result<(), FailureCause> {
        Err(FailureCause::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        })
    };

    if path.is_empty() {
        return invalid("empty path");
    }
    if path.starts_with('/') || path.contains('\\') {
        return invalid("must be a relative path using '/' separators");
    }
    if path.as_bytes().get(1) == Some(&b':') {
        return invalid("must not carry a drive prefix");
    }
    if path.chars().any(char::is_control) {
        return invalid("contains control characters");
    }

    for segment in path.split('/') {
        match segment {
            "" => return invalid("contains an empty segment"),
            "." | ".." => return invalid("escapes the repository root"),
            s if s.eq_ignore_ascii_case(".git") => return invalid("targets the .git directory"),
            _ => {}
        }
    }
    Ok(())
}
