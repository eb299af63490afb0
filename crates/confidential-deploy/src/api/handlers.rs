//! HTTP request handlers.

use super::types::{DeployResponse, HealthResponse, RootCertRequest};
use super::AppState;
use crate::error::DeployError;
use crate::types::{CoordinatorDeployment, DeploymentRequest, Endpoint, KeyRecord, Template};
use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Deploy a confidential template onto an endpoint.
pub async fn deploy_template(
    State(state): State<AppState>,
    Json(request): Json<DeploymentRequest>,
) -> Result<Json<DeployResponse>, DeployError> {
    info!(
        template_id = request.template_id,
        endpoint_id = request.endpoint_id,
        name = %request.name,
        "Deployment request received"
    );

    let outcome = state.orchestrator.deploy(&request).await?;
    Ok(Json(outcome.into()))
}

/// List templates.
pub async fn list_templates(
    State(state): State<AppState>,
) -> Result<Json<Vec<Template>>, DeployError> {
    Ok(Json(state.orchestrator.store().templates.list().await?))
}

/// Create or replace a template.
pub async fn put_template(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(template): Json<Template>,
) -> Result<Json<Template>, DeployError> {
    check_id(id, template.id)?;
    state
        .orchestrator
        .store()
        .templates
        .update(&id.to_string(), &template)
        .await?;

    info!(template_id = id, image = %template.image, "Template stored");
    Ok(Json(template))
}

/// List endpoints.
pub async fn list_endpoints(
    State(state): State<AppState>,
) -> Result<Json<Vec<Endpoint>>, DeployError> {
    Ok(Json(state.orchestrator.store().endpoints.list().await?))
}

/// Create or replace an endpoint.
pub async fn put_endpoint(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(endpoint): Json<Endpoint>,
) -> Result<Json<Endpoint>, DeployError> {
    check_id(id, endpoint.id)?;
    state
        .orchestrator
        .store()
        .endpoints
        .update(&id.to_string(), &endpoint)
        .await?;

    info!(endpoint_id = id, url = %endpoint.url, "Endpoint stored");
    Ok(Json(endpoint))
}

/// Store a volume's protected-file key. The key itself is never echoed back.
pub async fn put_key(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(key): Json<KeyRecord>,
) -> Result<axum::http::StatusCode, DeployError> {
    check_id(id, key.id)?;
    if key.pf_key.is_empty() {
        return Err(DeployError::Validation("pf_key is empty".into()));
    }

    state
        .orchestrator
        .store()
        .keys
        .update(&id.to_string(), &key)
        .await?;

    info!(key_id = id, "Volume key stored");
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Coordinator trust state of an endpoint.
pub async fn get_coordinator_deployment(
    State(state): State<AppState>,
    Path(endpoint_id): Path<u64>,
) -> Result<Json<CoordinatorDeployment>, DeployError> {
    Ok(Json(
        state.orchestrator.coordinator_deployment(endpoint_id).await?,
    ))
}

/// Record the root certificate of an endpoint's coordinator.
pub async fn put_root_cert(
    State(state): State<AppState>,
    Path(endpoint_id): Path<u64>,
    Json(request): Json<RootCertRequest>,
) -> Result<Json<CoordinatorDeployment>, DeployError> {
    Ok(Json(
        state
            .orchestrator
            .set_root_cert(endpoint_id, request.root_cert)
            .await?,
    ))
}

fn check_id(path_id: u64, body_id: u64) -> Result<(), DeployError> {
    if path_id != body_id {
        return Err(DeployError::Validation(format!(
            "id in path ({}) does not match id in body ({})",
            path_id, body_id
        )));
    }
    Ok(())
}
