use serde::{Deserialize, Serialize};

use crate::workflow::types::{ChangeSet, RepoId, Secret};

/// Input of the analysis stage.
#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    pub api_key: Secret,
    pub access_token: Secret,
    pub repository: RepoId,
    pub branch: String,
    pub query: String,
}

/// Undecoded analysis service response. The orchestrator turns it into a
/// [`ChangeSet`] with [`crate::workflow::parse::parse_change_set`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResponse(pub serde_json::Value);

/// Input of the mutation stage.
#[derive(Debug, Clone)]
pub struct MutateRequest {
    pub access_token: Secret,
    pub repository: RepoId,
    pub source_branch: String,
    pub new_branch: String,
    pub commit_message: String,
    pub changes: ChangeSet,
}

/// A branch created by the mutation stage and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCommit {
    pub branch: String,
    pub commit_sha: String,
}

/// Input of the pull request stage.
#[derive(Debug, Clone)]
pub struct PullRequestDraft {
    pub access_token: Secret,
    pub repository: RepoId,
    pub head_branch: String,
    pub base_branch: String,
    pub title: String,
    pub body: String,
}

/// An opened pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
}

/// Input of the repository indexing call.
#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub api_key: Secret,
    pub access_token: Secret,
    pub repository: RepoId,
    pub branch: String,
}
