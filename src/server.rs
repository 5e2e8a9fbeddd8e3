use std::sync::Arc;

use axum::{routing::post, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::platform::greptile::GreptileClient;
use crate::platform::Indexer;
use crate::workflow::Orchestrator;

pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Orchestrator,
    pub indexer: Arc<dyn Indexer>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let orchestrator = Orchestrator::from_config(&config);
        let indexer = Arc::new(GreptileClient::new(&config.greptile));

        Self {
            config,
            orchestrator,
            indexer,
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/index-repo", post(crate::api::handler::index_repo))
        .route("/submit", post(crate::api::handler::submit))
        .route("/health", axum::routing::get(health_check))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}
