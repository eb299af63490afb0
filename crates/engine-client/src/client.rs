//! Docker Engine API client implementation.

use crate::error::EngineError;
use crate::types::*;
use hyper::{Body, Client, Method, Request};
use hyperlocal::{UnixClientExt, Uri};
use std::path::Path;
use tracing::{debug, instrument, warn};
use urlencoding::encode;

#[derive(Clone, Debug)]
enum Transport {
    /// Path of the engine's unix socket.
    Unix(String),
    /// `http://host:port` base of a TCP-exposed engine.
    Tcp(String),
}

/// Client for a Docker-compatible container engine.
#[derive(Clone, Debug)]
pub struct EngineClient {
    transport: Transport,
}

impl EngineClient {
    /// Client talking to the engine over a unix socket.
    pub fn unix(socket_path: impl Into<String>) -> Self {
        Self {
            transport: Transport::Unix(socket_path.into()),
        }
    }

    /// Client talking to the engine over plain TCP (`http://host:port`).
    pub fn tcp(base_url: impl Into<String>) -> Self {
        Self {
            transport: Transport::Tcp(base_url.into().trim_end_matches('/').to_string()),
        }
    }

    /// Build a client from an environment URL such as `unix:///var/run/docker.sock`
    /// or `tcp://10.0.0.5:2375`.
    pub fn from_endpoint_url(url: &str) -> Result<Self, EngineError> {
        if let Some(path) = url.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(EngineError::UnsupportedEndpoint(url.to_string()));
            }
            return Ok(Self::unix(path));
        }
        if let Some(rest) = url.strip_prefix("tcp://") {
            return Ok(Self::tcp(format!("http://{}", rest)));
        }
        if url.starts_with("http://") {
            return Ok(Self::tcp(url));
        }
        Err(EngineError::UnsupportedEndpoint(url.to_string()))
    }

    /// Pull an image, draining the progress stream until the engine finishes.
    #[instrument(skip(self))]
    pub async fn pull_image(&self, reference: &str) -> Result<(), EngineError> {
        let (name, tag) = split_image_reference(reference);
        let mut path = format!("/images/create?fromImage={}", encode(name));
        // Without a tag the engine pulls every tag of the repository.
        match tag {
            Some(tag) => path.push_str(&format!("&tag={}", encode(tag))),
            None if !name.contains('@') => path.push_str("&tag=latest"),
            None => {}
        }

        let response = self.request(Method::POST, &path, None).await?;

        // Pull failures after the stream started are reported inline with a 200 status.
        for line in String::from_utf8_lossy(&response).lines() {
            if let Ok(progress) = serde_json::from_str::<serde_json::Value>(line) {
                if let Some(err) = progress.get("error").and_then(|e| e.as_str()) {
                    warn!(image = %reference, error = %err, "Image pull failed");
                    return Err(EngineError::Api {
                        status: 500,
                        message: err.to_string(),
                    });
                }
            }
        }

        debug!(image = %reference, "Image pulled");
        Ok(())
    }

    /// Inspect a local image.
    #[instrument(skip(self))]
    pub async fn inspect_image(&self, reference: &str) -> Result<ImageInspect, EngineError> {
        let path = format!("/images/{}/json", reference);
        let response = self.request(Method::GET, &path, None).await?;
        Ok(serde_json::from_slice(&response)?)
    }

    /// Inspect a named volume.
    #[instrument(skip(self))]
    pub async fn inspect_volume(&self, name: &str) -> Result<VolumeInspect, EngineError> {
        let path = format!("/volumes/{}", encode(name));
        let response = self.request(Method::GET, &path, None).await?;
        Ok(serde_json::from_slice(&response)?)
    }

    /// Create a container and return its id.
    #[instrument(skip(self, body), fields(image = %body.image))]
    pub async fn create_container(
        &self,
        name: &str,
        body: &ContainerCreateBody,
    ) -> Result<ContainerCreateResponse, EngineError> {
        let path = format!("/containers/create?name={}", encode(name));
        let payload = serde_json::to_vec(body)?;
        let response = self.request(Method::POST, &path, Some(payload)).await?;
        let created: ContainerCreateResponse = serde_json::from_slice(&response)?;

        for warning in created.warnings.iter().flatten() {
            warn!(container = %name, %warning, "Engine warning on create");
        }
        debug!(container = %name, id = %created.id, "Container created");
        Ok(created)
    }

    /// Start a created container.
    #[instrument(skip(self))]
    pub async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        let path = format!("/containers/{}/start", id);
        self.request(Method::POST, &path, None).await?;
        Ok(())
    }

    /// Attach a container to a network.
    #[instrument(skip(self))]
    pub async fn connect_network(&self, network: &str, container: &str) -> Result<(), EngineError> {
        let path = format!("/networks/{}/connect", encode(network));
        let body = serde_json::to_vec(&NetworkMembership {
            container,
            force: None,
        })?;
        self.request(Method::POST, &path, Some(body)).await?;
        Ok(())
    }

    /// Detach a container from a network.
    #[instrument(skip(self))]
    pub async fn disconnect_network(
        &self,
        network: &str,
        container: &str,
        force: bool,
    ) -> Result<(), EngineError> {
        let path = format!("/networks/{}/disconnect", encode(network));
        let body = serde_json::to_vec(&NetworkMembership {
            container,
            force: Some(force),
        })?;
        self.request(Method::POST, &path, Some(body)).await?;
        Ok(())
    }

    /// Make an HTTP request to the engine.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, EngineError> {
        let body = match body {
            Some(b) => Body::from(b),
            None => Body::empty(),
        };

        let response = match &self.transport {
            Transport::Unix(socket_path) => {
                if !Path::new(socket_path).exists() {
                    return Err(EngineError::SocketNotFound(socket_path.clone()));
                }
                let uri: hyper::Uri = Uri::new(socket_path, path).into();
                Client::unix().request(build_request(method, uri, body)?).await?
            }
            Transport::Tcp(base) => {
                let uri: hyper::Uri = format!("{}{}", base, path)
                    .parse()
                    .map_err(|e| EngineError::InvalidRequest(format!("Invalid URI: {}", e)))?;
                Client::new().request(build_request(method, uri, body)?).await?
            }
        };

        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<EngineMessage>(&bytes)
                .map(|m| m.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
            warn!(%status, %path, %message, "Engine request failed");
            return Err(EngineError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(bytes.to_vec())
    }
}

fn build_request(method: Method, uri: hyper::Uri, body: Body) -> Result<Request<Body>, EngineError> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(body)
        .map_err(|e| EngineError::InvalidRequest(format!("Failed to build request: {}", e)))
}

/// Split `registry:5000/app:1.2` into (`registry:5000/app`, `Some("1.2")`).
///
/// Digest references are passed through whole.
pub fn split_image_reference(reference: &str) -> (&str, Option<&str>) {
    if reference.contains('@') {
        return (reference, None);
    }
    let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
    match reference[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            (&reference[..split], Some(&reference[split + 1..]))
        }
        None => (reference, None),
    }
}
