use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::platform::types::{BranchCommit, IndexRequest, PullRequestRef};
use crate::workflow::types::{
    AnalysisQuery, ChangeRequestParameters, OutcomeStatus, PipelineOutcome, Stage, Submission,
    WorkflowContext,
};

/// Body of `POST /index-repo`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRepoBody {
    pub api_key: String,
    pub github_token: String,
    pub github_repo: String,
    pub github_branch: String,
}

// Manual Debug impl to avoid leaking credentials
impl std::fmt::Debug for IndexRepoBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexRepoBody")
            .field("api_key", &"[REDACTED]")
            .field("github_token", &"[REDACTED]")
            .field("github_repo", &self.github_repo)
            .field("github_branch", &self.github_branch)
            .finish()
    }
}

impl IndexRepoBody {
    pub fn into_request(self) -> Result<IndexRequest> {
        let context = WorkflowContext::new(
            &self.api_key,
            &self.github_token,
            &self.github_repo,
            &self.github_branch,
        )?;

        Ok(IndexRequest {
            api_key: context.analysis_credential,
            access_token: context.repo_access_token,
            repository: context.repository,
            branch: context.source_branch,
        })
    }
}

/// Body of `POST /submit`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
    pub api_key: String,
    pub github_token: String,
    pub github_repo: String,
    pub github_branch: String,
    pub new_branch: String,
    pub commit_message: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub query: Option<String>,
}

// Manual Debug impl to avoid leaking credentials
impl std::fmt::Debug for SubmitBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitBody")
            .field("api_key", &"[REDACTED]")
            .field("github_token", &"[REDACTED]")
            .field("github_repo", &self.github_repo)
            .field("github_branch", &self.github_branch)
            .field("new_branch", &self.new_branch)
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

impl SubmitBody {
    /// Validate every field up front so no stage ever sees partial input.
    pub fn into_submission(self, default_query: &str) -> Result<Submission> {
        let context = WorkflowContext::new(
            &self.api_key,
            &self.github_token,
            &self.github_repo,
            &self.github_branch,
        )?;
        let change_request = ChangeRequestParameters::new(
            &self.new_branch,
            &self.commit_message,
            &self.title,
            &self.body,
        )?;
        let query = AnalysisQuery::or_default(self.query.as_deref(), default_query)?;

        Ok(Submission {
            context,
            query,
            change_request,
        })
    }
}

/// JSON rendering of a [`PipelineOutcome`].
#[derive(Debug, Serialize)]
pub struct OutcomeResponse {
    pub status: OutcomeStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// Branch left behind when the pull request could not be opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchCommit>,
}

impl From<&PipelineOutcome> for OutcomeResponse {
    fn from(outcome: &PipelineOutcome) -> Self {
        let mut response = OutcomeResponse {
            status: outcome.status(),
            message: outcome.summary(),
            pull_request: None,
            stage: None,
            failure: None,
            cause: None,
            branch: None,
        };

        match outcome {
            PipelineOutcome::Completed(pr) => response.pull_request = Some(pr.clone()),
            PipelineOutcome::NoChanges => {}
            PipelineOutcome::Aborted { failure, branch } => {
                response.stage = Some(failure.stage());
                response.failure = Some(failure.kind());
                response.cause = Some(failure.cause().to_string());
                response.branch = branch.clone();
            }
        }
        response
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
