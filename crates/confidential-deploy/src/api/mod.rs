//! HTTP API for the deployment service.

mod handlers;
mod middleware;
mod types;

pub use handlers::*;
pub use middleware::logging_middleware;
pub use types::*;

use crate::deploy::Orchestrator;
use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Deployment orchestrator and the stores behind it
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Create new application state.
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Deployment
        .route(
            "/v1/confidential-templates/deploy",
            post(handlers::deploy_template),
        )
        // Records read by deployments
        .route("/v1/templates", get(handlers::list_templates))
        .route("/v1/templates/:id", put(handlers::put_template))
        .route("/v1/endpoints", get(handlers::list_endpoints))
        .route("/v1/endpoints/:id", put(handlers::put_endpoint))
        .route("/v1/keys/:id", put(handlers::put_key))
        // Coordinator trust state
        .route(
            "/v1/coordinator-deployments/:endpoint_id",
            get(handlers::get_coordinator_deployment),
        )
        .route(
            "/v1/coordinator-deployments/:endpoint_id/root-cert",
            put(handlers::put_root_cert),
        )
        .layer(axum_middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
