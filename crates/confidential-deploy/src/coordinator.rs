//! Coordinator sessions for an endpoint.

use crate::error::DeployError;
use crate::manifest::TrustMaterial;
use crate::types::Endpoint;
use async_trait::async_trait;
use coordinator_client::{CoordinatorClient, Manifest, ManifestPath, SecretPayload};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Manifest and secret submission to one coordinator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Coordinator: Send + Sync {
    async fn submit_manifest(&self, path: ManifestPath, manifest: &Manifest)
        -> Result<(), DeployError>;

    async fn submit_secrets(&self, secrets: &SecretPayload) -> Result<(), DeployError>;
}

#[async_trait]
impl Coordinator for CoordinatorClient {
    async fn submit_manifest(
        &self,
        path: ManifestPath,
        manifest: &Manifest,
    ) -> Result<(), DeployError> {
        Ok(CoordinatorClient::submit_manifest(self, path, manifest).await?)
    }

    async fn submit_secrets(&self, secrets: &SecretPayload) -> Result<(), DeployError> {
        Ok(CoordinatorClient::submit_secrets(self, secrets).await?)
    }
}

/// Opens a [`Coordinator`] session for an endpoint with the given credentials.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoordinatorConnector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        trust: &TrustMaterial,
    ) -> Result<Arc<dyn Coordinator>, DeployError>;
}

/// Where the coordinator listens relative to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub scheme: String,
    /// Name the coordinator's TLS certificate is issued for.
    pub server_name: String,
    pub api_port: u16,
    pub timeout: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            scheme: "https".into(),
            server_name: "coordinator".into(),
            api_port: 9001,
            timeout: Duration::from_secs(30),
        }
    }
}

impl CoordinatorSettings {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.server_name, self.api_port)
    }
}

/// Connects over mutually authenticated TLS.
///
/// The coordinator's server name is pinned to the endpoint host so the
/// connection reaches the endpoint machine while certificate checks use the
/// coordinator's name.
#[derive(Debug, Clone, Default)]
pub struct MtlsConnector {
    settings: CoordinatorSettings,
}

impl MtlsConnector {
    pub fn new(settings: CoordinatorSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl CoordinatorConnector for MtlsConnector {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        trust: &TrustMaterial,
    ) -> Result<Arc<dyn Coordinator>, DeployError> {
        let host = endpoint.host();
        let addr = tokio::net::lookup_host((host.as_str(), self.settings.api_port))
            .await
            .map_err(|e| DeployError::Coordinator(format!("cannot resolve {}: {}", host, e)))?
            .next()
            .ok_or_else(|| DeployError::Coordinator(format!("no address for {}", host)))?;

        let mut builder = CoordinatorClient::builder(self.settings.base_url())
            .resolve(self.settings.server_name.clone(), addr)
            .identity(trust.user_cert.clone(), trust.user_private_key.clone())
            .timeout(self.settings.timeout);
        if let Some(root) = &trust.root_cert {
            builder = builder.root_certificate(root.clone());
        }

        let client = builder.build()?;
        debug!(endpoint_id = endpoint.id, %addr, base_url = %client.base_url(), "Coordinator session ready");
        Ok(Arc::new(client))
    }
}
