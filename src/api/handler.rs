use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::api::types::{ErrorResponse, IndexRepoBody, OutcomeResponse, SubmitBody};
use crate::server::AppState;
use crate::workflow::types::PipelineOutcome;

fn error(status: StatusCode, message: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Kick off indexing of a repository so later analyses have something to query.
pub async fn index_repo(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IndexRepoBody>,
) -> Response {
    let request = match body.into_request() {
        Ok(request) => request,
        Err(e) => return error(StatusCode::UNPROCESSABLE_ENTITY, e),
    };

    tracing::info!(repo = %request.repository, branch = %request.branch, "Indexing repository");

    match state.indexer.index_repository(&request).await {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(e) => {
            tracing::warn!(repo = %request.repository, error = %e, "Indexing request failed");
            error(StatusCode::BAD_GATEWAY, e)
        }
    }
}

/// Run the full analyze -> branch -> pull request pipeline for one submission.
///
/// If the client disconnects the handler future is dropped and the run is
/// abandoned where it stands.
pub async fn submit(State(state): State<Arc<AppState>>, Json(body): Json<SubmitBody>) -> Response {
    let submission = match body.into_submission(&state.config.greptile.default_query) {
        Ok(submission) => submission,
        Err(e) => return error(StatusCode::UNPROCESSABLE_ENTITY, e),
    };

    match state.orchestrator.run(&submission).await {
        Ok(outcome) => {
            let status = match &outcome {
                PipelineOutcome::Completed(_) => StatusCode::CREATED,
                PipelineOutcome::NoChanges => StatusCode::OK,
                PipelineOutcome::Aborted { .. } => StatusCode::BAD_GATEWAY,
            };
            tracing::info!(summary = %outcome.summary(), "Submission finished");
            (status, Json(OutcomeResponse::from(&outcome))).into_response()
        }
        Err(busy) => {
            tracing::warn!("Rejected submission while another is in progress");
            error(StatusCode::CONFLICT, busy)
        }
    }
}
