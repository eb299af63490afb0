//! Coordinator HTTP client over mutually authenticated TLS.

use crate::error::CoordinatorError;
use crate::types::*;
use reqwest::{Certificate, Client, Identity, Response};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const PEM_CERTIFICATE_MARKER: &str = "-----BEGIN CERTIFICATE-----";

/// Coordinator client.
///
/// When a root certificate is configured it is the only trust anchor;
/// otherwise the built-in web roots are used.
#[derive(Clone)]
pub struct CoordinatorClient {
    client: Client,
    base_url: String,
}

/// Builder for [`CoordinatorClient`].
pub struct CoordinatorClientBuilder {
    base_url: String,
    root_cert_pem: Option<String>,
    identity_pem: Option<(String, String)>,
    resolve: Option<(String, SocketAddr)>,
    timeout: Duration,
}

impl CoordinatorClientBuilder {
    /// Trust only this PEM-encoded root certificate.
    pub fn root_certificate(mut self, pem: impl Into<String>) -> Self {
        self.root_cert_pem = Some(pem.into());
        self
    }

    /// Present this PEM certificate and PEM private key as the client identity.
    pub fn identity(mut self, cert_pem: impl Into<String>, key_pem: impl Into<String>) -> Self {
        self.identity_pem = Some((cert_pem.into(), key_pem.into()));
        self
    }

    /// Connect to `addr` whenever `host` is requested. TLS still verifies `host`.
    pub fn resolve(mut self, host: impl Into<String>, addr: SocketAddr) -> Self {
        self.resolve = Some((host.into(), addr));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<CoordinatorClient, CoordinatorError> {
        let mut builder = Client::builder().use_rustls_tls().timeout(self.timeout);

        match &self.root_cert_pem {
            Some(pem) => {
                if !pem.contains(PEM_CERTIFICATE_MARKER) {
                    return Err(CoordinatorError::InvalidRootCertificate(
                        "no PEM certificate block found".into(),
                    ));
                }
                let root = Certificate::from_pem(pem.as_bytes())
                    .map_err(|e| CoordinatorError::InvalidRootCertificate(e.to_string()))?;
                builder = builder
                    .tls_built_in_root_certs(false)
                    .add_root_certificate(root);
            }
            None => {
                info!("No coordinator root certificate stored, using system trust roots");
            }
        }

        if let Some((cert, key)) = &self.identity_pem {
            let mut bundle = Vec::with_capacity(cert.len() + key.len() + 1);
            bundle.extend_from_slice(cert.as_bytes());
            bundle.push(b'\n');
            bundle.extend_from_slice(key.as_bytes());
            let identity = Identity::from_pem(&bundle)
                .map_err(|e| CoordinatorError::InvalidIdentity(e.to_string()))?;
            builder = builder.identity(identity);
        }

        if let Some((host, addr)) = &self.resolve {
            builder = builder.resolve(host, *addr);
        }

        Ok(CoordinatorClient {
            client: builder.build()?,
            base_url: self.base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl CoordinatorClient {
    /// Start building a client for the coordinator API at `base_url`.
    pub fn builder(base_url: impl Into<String>) -> CoordinatorClientBuilder {
        CoordinatorClientBuilder {
            base_url: base_url.into(),
            root_cert_pem: None,
            identity_pem: None,
            resolve: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a manifest to the bootstrap or update path.
    #[instrument(skip(self, manifest), fields(packages = manifest.packages.len(), marbles = manifest.marbles.len()))]
    pub async fn submit_manifest(
        &self,
        path: ManifestPath,
        manifest: &Manifest,
    ) -> Result<(), CoordinatorError> {
        let body = serde_json::to_vec(manifest)?;
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path.as_str()))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        self.check(response).await?;
        debug!(%path, "Manifest accepted by coordinator");
        Ok(())
    }

    /// Submit user-defined secret values.
    #[instrument(skip(self, secrets), fields(count = secrets.len()))]
    pub async fn submit_secrets(&self, secrets: &SecretPayload) -> Result<(), CoordinatorError> {
        let response = self
            .client
            .post(format!("{}/secrets", self.base_url))
            .json(secrets)
            .send()
            .await?;

        self.check(response).await?;
        debug!("Secrets accepted by coordinator");
        Ok(())
    }

    async fn check(&self, response: Response) -> Result<String, CoordinatorError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            warn!(status = %status, body = %body, "Coordinator request failed");
            return Err(CoordinatorError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}
