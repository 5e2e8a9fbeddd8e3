use thiserror::Error;

use crate::workflow::types::Stage;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Greptile API error: {0}")]
    GreptileApi(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Why a stage did not produce its payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureCause {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("duplicate change for path {0}")]
    DuplicatePath(String),

    #[error("branch exists: {0}")]
    BranchExists(String),

    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("head and base branch are both {0}")]
    IdenticalBranches(String),

    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// A failed stage, tagged with the stage it came from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("AnalysisFailure: {0}")]
    Analysis(FailureCause),

    #[error("MutationFailure: {0}")]
    Mutation(FailureCause),

    #[error("RequestCreationFailure: {0}")]
    RequestCreation(FailureCause),
}

impl StageError {
    pub fn new(stage: Stage, cause: FailureCause) -> Self {
        match stage {
            Stage::Analyze => StageError::Analysis(cause),
            Stage::Mutate => StageError::Mutation(cause),
            Stage::CreateRequest => StageError::RequestCreation(cause),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            StageError::Analysis(_) => Stage::Analyze,
            StageError::Mutation(_) => Stage::Mutate,
            StageError::RequestCreation(_) => Stage::CreateRequest,
        }
    }

    pub fn cause(&self) -> &FailureCause {
        match self {
            StageError::Analysis(cause)
            | StageError::Mutation(cause)
            | StageError::RequestCreation(cause) => cause,
        }
    }

    /// Taxonomy name surfaced to callers, e.g. `MutationFailure`.
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::Analysis(_) => "AnalysisFailure",
            StageError::Mutation(_) => "MutationFailure",
            StageError::RequestCreation(_) => "RequestCreationFailure",
        }
    }
}

pub type StageResult<T> = std::result::Result<T, StageError>;
