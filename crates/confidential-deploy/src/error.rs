//! Error types for the deployment orchestrator.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use coordinator_client::CoordinatorError;
use serde::Serialize;
use thiserror::Error;

/// Deployment error categories.
///
/// Every variant carries the underlying cause as text so it can be surfaced
/// to the caller without leaking internal types across the API boundary.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    Lookup(String),

    #[error("Image is missing enclave identity label: {0}")]
    IdentityMissing(String),

    #[error("Trust bootstrap failed: {0}")]
    TrustBootstrapFailed(String),

    #[error("Coordinator rejected request: {status} - {body}")]
    CoordinatorRejected { status: u16, body: String },

    #[error("Coordinator unreachable: {0}")]
    Coordinator(String),

    #[error("Encryption key not found: {0}")]
    KeyNotFound(String),

    #[error("Volume inspection failed: {0}")]
    VolumeInspectionFailed(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Container runtime error: {0}")]
    Runtime(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// Storage backend errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl DeployError {
    /// Stable machine-readable code for the error category.
    pub fn code(&self) -> &'static str {
        match self {
            DeployError::Validation(_) => "VALIDATION_ERROR",
            DeployError::Lookup(_) => "NOT_FOUND",
            DeployError::IdentityMissing(_) => "IDENTITY_MISSING",
            DeployError::TrustBootstrapFailed(_) => "TRUST_BOOTSTRAP_FAILED",
            DeployError::CoordinatorRejected { .. } => "COORDINATOR_REJECTED",
            DeployError::Coordinator(_) => "COORDINATOR_UNAVAILABLE",
            DeployError::KeyNotFound(_) => "KEY_NOT_FOUND",
            DeployError::VolumeInspectionFailed(_) => "VOLUME_INSPECTION_FAILED",
            DeployError::KeyGeneration(_) => "KEY_GENERATION_FAILED",
            DeployError::Runtime(_) => "RUNTIME_ERROR",
            DeployError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            DeployError::Validation(_) => StatusCode::BAD_REQUEST,
            DeployError::Lookup(_) => StatusCode::NOT_FOUND,
            DeployError::IdentityMissing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DeployError::KeyNotFound(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DeployError::CoordinatorRejected { .. } | DeployError::Coordinator(_) => {
                StatusCode::BAD_GATEWAY
            }
            DeployError::VolumeInspectionFailed(_) | DeployError::Runtime(_) => {
                StatusCode::BAD_GATEWAY
            }
            DeployError::TrustBootstrapFailed(_)
            | DeployError::KeyGeneration(_)
            | DeployError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DeployError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };

        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for DeployError {
    fn from(e: StoreError) -> Self {
        DeployError::Persistence(e.to_string())
    }
}

impl From<CoordinatorError> for DeployError {
    fn from(e: CoordinatorError) -> Self {
        match e {
            CoordinatorError::Rejected { status, body } => {
                DeployError::CoordinatorRejected { status, body }
            }
            CoordinatorError::InvalidIdentity(msg) => DeployError::TrustBootstrapFailed(msg),
            other => DeployError::Coordinator(other.to_string()),
        }
    }
}

impl From<engine_client::EngineError> for DeployError {
    fn from(e: engine_client::EngineError) -> Self {
        DeployError::Runtime(e.to_string())
    }
}

impl From<aes_gcm::Error> for StoreError {
    fn from(_: aes_gcm::Error) -> Self {
        StoreError::Encryption("AES-GCM encryption/decryption failed".to_string())
    }
}
