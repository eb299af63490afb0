//! API request and response types.

use crate::types::DeploymentOutcome;
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response after a successful deployment.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeployResponse {
    pub container_id: String,
    pub marble: String,
    /// The endpoint's coordinator received its first manifest
    pub bootstrapped: bool,
}

impl From<DeploymentOutcome> for DeployResponse {
    fn from(outcome: DeploymentOutcome) -> Self {
        Self {
            container_id: outcome.container_id,
            marble: outcome.marble,
            bootstrapped: outcome.bootstrapped,
        }
    }
}

/// Request to record a coordinator's root certificate.
#[derive(Debug, Deserialize)]
pub struct RootCertRequest {
    /// PEM-encoded certificate
    pub root_cert: String,
}
