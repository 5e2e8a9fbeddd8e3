use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;

use crate::config::GreptileConfig;
use crate::error::{AppError, FailureCause, Result, StageError, StageResult};
use crate::platform::types::{AnalysisResponse, AnalyzeRequest, IndexRequest};
use crate::platform::{Indexer, StageAdapter};
use crate::workflow::types::{RepoId, Secret, Stage};

/// Longest slice of an error body kept in a failure cause.
const MAX_ERROR_BODY: usize = 512;

/// Client for the Greptile code search API: repository indexing and the
/// analysis stage's query call.
pub struct GreptileClient {
    client: Client,
    base_url: String,
    remote: String,
    reload: bool,
    notify: bool,
    genius: bool,
}

impl GreptileClient {
    pub fn new(config: &GreptileConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            remote: config.remote.clone(),
            reload: config.reload,
            notify: config.notify,
            genius: config.genius,
        }
    }

    fn post(&self, path: &str, api_key: &Secret, access_token: &Secret) -> RequestBuilder {
        self.client
            .post(format!("{}/{path}", self.base_url))
            .bearer_auth(api_key.expose())
            .header("X-GitHub-Token", access_token.expose())
            .header("content-type", "application/json")
    }

    /// Ask the analysis service about a repository and return its raw JSON answer.
    pub async fn query(
        &self,
        request: &AnalyzeRequest,
    ) -> std::result::Result<AnalysisResponse, FailureCause> {
        let body = QueryRequest {
            messages: vec![QueryMessage {
                id: "1",
                content: &request.query,
                role: "user",
            }],
            repositories: vec![self.repository(&request.repository, &request.branch)],
            genius: self.genius,
        };

        let response = self
            .post("query", &request.api_key, &request.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| FailureCause::Transport(e.to_string()))?;

        let response = ensure_success(response).await?;

        let value = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| FailureCause::MalformedResponse(format!("response is not JSON: {e}")))?;

        Ok(AnalysisResponse(value))
    }

    fn repository<'a>(&'a self, repository: &RepoId, branch: &'a str) -> RepositoryRef<'a> {
        RepositoryRef {
            remote: &self.remote,
            repository: repository.to_string(),
            branch,
        }
    }
}

#[async_trait]
impl StageAdapter for GreptileClient {
    type Request = AnalyzeRequest;
    type Payload = AnalysisResponse;

    async fn execute(&self, request: AnalyzeRequest) -> StageResult<AnalysisResponse> {
        self.query(&request)
            .await
            .map_err(|cause| StageError::new(Stage::Analyze, cause))
    }
}

#[async_trait]
impl Indexer for GreptileClient {
    async fn index_repository(&self, request: &IndexRequest) -> Result<serde_json::Value> {
        let body = IndexRepositoryRequest {
            remote: &self.remote,
            repository: request.repository.to_string(),
            branch: &request.branch,
            reload: self.reload,
            notify: self.notify,
        };

        let response = self
            .post("repositories", &request.api_key, &request.access_token)
            .json(&body)
            .send()
            .await?;

        let response = ensure_success(response)
            .await
            .map_err(|cause| AppError::GreptileApi(cause.to_string()))?;

        Ok(response.json::<serde_json::Value>().await?)
    }
}

async fn ensure_success(response: Response) -> std::result::Result<Response, FailureCause> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(FailureCause::Rejected {
        status: status.as_u16(),
        message: truncate(body.trim(), MAX_ERROR_BODY),
    })
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

// --- Request types ---

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    messages: Vec<QueryMessage<'a>>,
    repositories: Vec<RepositoryRef<'a>>,
    genius: bool,
}

#[derive(Debug, Serialize)]
struct QueryMessage<'a> {
    id: &'a str,
    content: &'a str,
    role: &'a str,
}

#[derive(Debug, Serialize)]
struct RepositoryRef<'a> {
    remote: &'a str,
    repository: String,
    branch: &'a str,
}

#[derive(Debug, Serialize)]
struct IndexRepositoryRequest<'a> {
    remote: &'a str,
    repository: String,
    branch: &'a str,
    reload: bool,
    notify: bool,
}
