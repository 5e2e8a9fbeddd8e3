use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, FailureCause, Result, StageError};
use crate::platform::types::{BranchCommit, PullRequestRef};

/// The three remote stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analyze,
    Mutate,
    CreateRequest,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Analyze, Stage::Mutate, Stage::CreateRequest];

    /// 1-based position in the pipeline.
    pub fn number(self) -> u8 {
        match self {
            Stage::Analyze => 1,
            Stage::Mutate => 2,
            Stage::CreateRequest => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Analyze => "analyze",
            Stage::Mutate => "mutate",
            Stage::CreateRequest => "create_request",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} ({})", self.number(), self.as_str())
    }
}

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Repository identifier of the form `<owner>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    pub fn parse(full_name: &str) -> Result<Self> {
        let full_name = full_name.trim();
        match full_name.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(AppError::Validation(format!(
                "repository must be of the form \"<owner>/<name>\", got {full_name:?}"
            ))),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `owner/name` with both halves percent-encoded, for use in API routes.
    pub fn route_segment(&self) -> String {
        format!(
            "{}/{}",
            urlencoding::encode(&self.owner),
            urlencoding::encode(&self.name)
        )
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Validate a git branch name.
/// Rejects names starting with `-` as well as the forms git refuses outright.
pub fn validate_branch_name(field: &str, name: &str) -> Result<()> {
    let invalid = |reason: &str| -> Result<()> {
        Err(AppError::Validation(format!(
            "{field} {name:?} is not a valid branch name: {reason}"
        )))
    };

    if name.is_empty() {
        return invalid("empty");
    }
    if name.starts_with('-') {
        return invalid("starts with '-'");
    }
    if name.starts_with('/') || name.ends_with('/') || name.ends_with('.') {
        return invalid("bad leading or trailing character");
    }
    if name.ends_with(".lock") {
        return invalid("ends with .lock");
    }
    if name.contains("..") || name.contains("//") || name.contains("@{") {
        return invalid("contains a forbidden sequence");
    }
    if name
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c))
    {
        return invalid("contains a forbidden character");
    }
    Ok(())
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Credentials and repository coordinates shared by every stage.
///
/// Built once per submission and only ever borrowed afterwards.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub analysis_credential: Secret,
    pub repo_access_token: Secret,
    pub repository: RepoId,
    pub source_branch: String,
}

impl WorkflowContext {
    pub fn new(
        analysis_credential: &str,
        repo_access_token: &str,
        repository: &str,
        source_branch: &str,
    ) -> Result<Self> {
        require("analysis credential", analysis_credential)?;
        require("repository access token", repo_access_token)?;
        let repository = RepoId::parse(repository)?;
        validate_branch_name("source branch", source_branch)?;

        Ok(Self {
            analysis_credential: Secret::new(analysis_credential),
            repo_access_token: Secret::new(repo_access_token),
            repository,
            source_branch: source_branch.to_string(),
        })
    }
}

/// What to name and how to describe the change on the hosting side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRequestParameters {
    pub new_branch: String,
    pub commit_message: String,
    pub title: String,
    pub body: String,
}

impl ChangeRequestParameters {
    pub fn new(new_branch: &str, commit_message: &str, title: &str, body: &str) -> Result<Self> {
        validate_branch_name("new branch", new_branch)?;
        require("commit message", commit_message)?;
        require("pull request title", title)?;

        Ok(Self {
            new_branch: new_branch.to_string(),
            commit_message: commit_message.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        })
    }
}

/// Instruction given to the analysis service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisQuery(String);

impl AnalysisQuery {
    pub fn new(query: &str) -> Result<Self> {
        require("analysis query", query)?;
        Ok(Self(query.trim().to_string()))
    }

    /// Use `query` unless it is missing or blank, else `default_query`.
    pub fn or_default(query: Option<&str>, default_query: &str) -> Result<Self> {
        match query.map(str::trim) {
            Some(query) if !query.is_empty() => Self::new(query),
            _ => Self::new(default_query),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Everything one run of the pipeline needs.
#[derive(Debug, Clone)]
pub struct Submission {
    pub context: WorkflowContext,
    pub query: AnalysisQuery,
    pub change_request: ChangeRequestParameters,
}

/// One proposed file edit: the path and its complete new content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub content: String,
}

/// Ordered, duplicate-free list of file changes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeSet(Vec<FileChange>);

impl ChangeSet {
    pub fn new(changes: Vec<FileChange>) -> std::result::Result<Self, FailureCause> {
        let mut seen = HashSet::new();
        for change in &changes {
            if change.path.trim().is_empty() {
                return Err(FailureCause::MalformedResponse(
                    "file change with empty path".to_string(),
                ));
            }
            if !seen.insert(change.path.as_str()) {
                return Err(FailureCause::DuplicatePath(change.path.clone()));
            }
        }
        Ok(Self(changes))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileChange> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[FileChange] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a FileChange;
    type IntoIter = std::slice::Iter<'a, FileChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Coarse classification of a [`PipelineOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    NoChanges,
    Aborted,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Completed => "completed",
            OutcomeStatus::NoChanges => "no_changes",
            OutcomeStatus::Aborted => "aborted",
        }
    }
}

/// Terminal result of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// All three stages succeeded and the pull request is open.
    Completed(PullRequestRef),
    /// The analysis proposed no changes; nothing was created remotely.
    NoChanges,
    /// A stage failed. `branch` is set when the branch from stage 2 was
    /// created but no pull request was opened for it.
    Aborted {
        failure: StageError,
        branch: Option<BranchCommit>,
    },
}

impl PipelineOutcome {
    pub fn aborted(failure: StageError) -> Self {
        PipelineOutcome::Aborted {
            failure,
            branch: None,
        }
    }

    pub fn status(&self) -> OutcomeStatus {
        match self {
            PipelineOutcome::Completed(_) => OutcomeStatus::Completed,
            PipelineOutcome::NoChanges => OutcomeStatus::NoChanges,
            PipelineOutcome::Aborted { .. } => OutcomeStatus::Aborted,
        }
    }

    /// Stage that aborted the run, if any.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            PipelineOutcome::Aborted { failure, .. } => Some(failure.stage()),
            _ => None,
        }
    }

    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        match self {
            PipelineOutcome::Completed(pr) => {
                format!("Opened pull request #{}: {}", pr.number, pr.url)
            }
            PipelineOutcome::NoChanges => {
                "The analysis proposed no file changes; nothing was created".to_string()
            }
            PipelineOutcome::Aborted {
                failure,
                branch: Some(branch),
            } => format!(
                "Aborted at {}: {failure}. Branch {} (commit {}) was created but has no pull request",
                failure.stage(),
                branch.branch,
                branch.commit_sha
            ),
            PipelineOutcome::Aborted {
                failure,
                branch: None,
            } => {
                let mut summary = format!("Aborted at {}: {failure}", failure.stage());
                if failure.stage() != Stage::Analyze
                    && matches!(failure.cause(), FailureCause::Timeout { .. })
                {
                    summary.push_str(
                        ". The remote call may still have completed; check the repository for a new branch or pull request",
                    );
                }
                summary
            }
        }
    }
}
