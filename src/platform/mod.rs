pub mod github;
pub mod greptile;
pub mod types;

use async_trait::async_trait;

use crate::error::{Result, StageResult};
use types::*;

/// One remote stage of the pipeline.
///
/// Implementations perform exactly one remote operation per call, never
/// retry, and turn every failure (transport, status, decoding) into a
/// [`crate::error::StageError`] instead of panicking.
#[async_trait]
pub trait StageAdapter: Send + Sync {
    type Request: Send + Sync;
    type Payload: Send;

    async fn execute(&self, request: Self::Request) -> StageResult<Self::Payload>;
}

pub type AnalyzeAdapter = dyn StageAdapter<Request = AnalyzeRequest, Payload = AnalysisResponse>;
pub type MutateAdapter = dyn StageAdapter<Request = MutateRequest, Payload = BranchCommit>;
pub type CreateRequestAdapter =
    dyn StageAdapter<Request = PullRequestDraft, Payload = PullRequestRef>;

/// Builds the search index the analysis stage queries. Runs outside the
/// pipeline, as its own user action.
#[async_trait]
pub trait Indexer: Send + Sync {
    async fn index_repository(&self, request: &IndexRequest) -> Result<serde_json::Value>;
}
