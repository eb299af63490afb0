//! Container runtime seam and workload container provisioning.

use crate::error::DeployError;
use crate::types::{DeploymentRequest, Endpoint, InputType, Template};
use async_trait::async_trait;
use engine_client::{
    ContainerCreateBody, DeviceMapping, EmptyObject, EngineClient, HostConfig, Mount, PortBinding,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// SGX device nodes passed into every workload, as (host, container) paths.
pub const SGX_DEVICES: [(&str, &str); 3] = [
    ("/dev/sgx/enclave", "/dev/sgx/enclave"),
    ("/dev/sgx/enclave", "/dev/sgx_enclave"),
    ("/dev/sgx_provision", "/dev/sgx_provision"),
];

/// Network every container starts on and is detached from after start.
pub const DEFAULT_NETWORK: &str = "bridge";

/// Operations the orchestrator needs from a container engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Pull `image` and return its labels.
    async fn pull_image(
        &self,
        image: &str,
    ) -> Result<HashMap<String, serde_json::Value>, DeployError>;

    /// Labels of an existing volume.
    async fn volume_labels(&self, volume: &str) -> Result<HashMap<String, String>, DeployError>;

    /// Create, attach and start the workload container; returns its id.
    async fn provision(&self, spec: &ContainerSpec) -> Result<String, DeployError>;
}

/// Opens a [`ContainerRuntime`] for an endpoint.
#[cfg_attr(test, mockall::automock)]
pub trait RuntimeConnector: Send + Sync {
    fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn ContainerRuntime>, DeployError>;
}

/// Workload settings shared by every container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSettings {
    /// `<coordinator>:<mesh port>` the workload registers with.
    pub coordinator_addr: String,
    /// Network the coordinator is reachable on.
    pub network: String,
    pub dns_names: String,
    pub domainname: String,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            coordinator_addr: "coordinator:2001".into(),
            network: "coordinator".into(),
            dns_names: "localhost,app".into(),
            domainname: "coordinator".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub container_port: u16,
    pub protocol: String,
    pub host_port: String,
}

impl PortMapping {
    /// Engine port key, e.g. `8080/tcp`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.container_port, self.protocol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
}

/// Everything needed to start one workload container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<String>,
    pub ports: Vec<PortMapping>,
    pub mounts: Vec<VolumeMount>,
    pub devices: Vec<(String, String)>,
    pub domainname: String,
    /// Network attached before start.
    pub network: String,
    /// Network detached after start.
    pub detach_network: String,
}

/// Derive the container spec for a validated request.
pub fn build_container_spec(
    template: &Template,
    request: &DeploymentRequest,
    settings: &ContainerSettings,
) -> Result<ContainerSpec, DeployError> {
    let mut ports = Vec::new();
    for input in template.inputs_of(InputType::Port) {
        let container = input.port_container.as_deref().ok_or_else(|| {
            DeployError::Validation(format!("port input {} has no container port", input.label))
        })?;
        let container_port = container.trim().parse::<u16>().map_err(|_| {
            DeployError::Validation(format!(
                "port input {} has invalid container port {:?}",
                input.label, container
            ))
        })?;

        let protocol = input
            .port_type
            .as_deref()
            .unwrap_or("tcp")
            .to_ascii_lowercase();
        if protocol != "tcp" && protocol != "udp" {
            return Err(DeployError::Validation(format!(
                "port input {} has unsupported protocol {}",
                input.label, protocol
            )));
        }

        ports.push(PortMapping {
            container_port,
            protocol,
            host_port: required_input(request, &input.label)?.to_string(),
        });
    }

    let mut mounts = Vec::new();
    for input in template.inputs_of(InputType::Volume) {
        mounts.push(VolumeMount {
            source: required_input(request, &input.label)?.to_string(),
            target: input.label.clone(),
        });
    }

    Ok(ContainerSpec {
        name: request.name.clone(),
        image: template.image.clone(),
        env: vec![
            format!("EDG_MARBLE_TYPE={}", request.marble_name()),
            format!("EDG_MARBLE_COORDINATOR_ADDR={}", settings.coordinator_addr),
            format!("EDG_MARBLE_DNS_NAMES={}", settings.dns_names),
        ],
        ports,
        mounts,
        devices: SGX_DEVICES
            .iter()
            .map(|(host, container)| (host.to_string(), container.to_string()))
            .collect(),
        domainname: settings.domainname.clone(),
        network: settings.network.clone(),
        detach_network: DEFAULT_NETWORK.to_string(),
    })
}

fn required_input<'a>(request: &'a DeploymentRequest, label: &str) -> Result<&'a str, DeployError> {
    request
        .input(label)
        .ok_or_else(|| DeployError::Validation(format!("values missing for inputs: {}", label)))
}

impl From<&ContainerSpec> for ContainerCreateBody {
    fn from(spec: &ContainerSpec) -> Self {
        let exposed_ports = spec
            .ports
            .iter()
            .map(|port| (port.key(), EmptyObject {}))
            .collect();

        let port_bindings = spec
            .ports
            .iter()
            .map(|port| {
                (
                    port.key(),
                    vec![PortBinding {
                        host_ip: String::new(),
                        host_port: port.host_port.clone(),
                    }],
                )
            })
            .collect();

        ContainerCreateBody {
            image: spec.image.clone(),
            env: spec.env.clone(),
            exposed_ports,
            domainname: Some(spec.domainname.clone()),
            host_config: HostConfig {
                port_bindings,
                publish_all_ports: true,
                mounts: spec
                    .mounts
                    .iter()
                    .map(|m| Mount {
                        mount_type: "volume".into(),
                        source: m.source.clone(),
                        target: m.target.clone(),
                    })
                    .collect(),
                devices: spec
                    .devices
                    .iter()
                    .map(|(host, container)| DeviceMapping {
                        path_on_host: host.clone(),
                        path_in_container: container.clone(),
                        cgroup_permissions: "rw".into(),
                    })
                    .collect(),
            },
        }
    }
}

/// [`ContainerRuntime`] backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct EngineRuntime {
    client: EngineClient,
}

impl EngineRuntime {
    pub fn new(client: EngineClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContainerRuntime for EngineRuntime {
    async fn pull_image(
        &self,
        image: &str,
    ) -> Result<HashMap<String, serde_json::Value>, DeployError> {
        self.client.pull_image(image).await?;
        let inspect = self.client.inspect_image(image).await?;
        Ok(inspect.labels())
    }

    async fn volume_labels(&self, volume: &str) -> Result<HashMap<String, String>, DeployError> {
        let inspect = self
            .client
            .inspect_volume(volume)
            .await
            .map_err(|e| DeployError::VolumeInspectionFailed(format!("{}: {}", volume, e)))?;
        Ok(inspect.labels.unwrap_or_default())
    }

    #[instrument(skip(self, spec), fields(container = %spec.name, image = %spec.image))]
    async fn provision(&self, spec: &ContainerSpec) -> Result<String, DeployError> {
        let body = ContainerCreateBody::from(spec);
        let created = self.client.create_container(&spec.name, &body).await?;

        self.client.connect_network(&spec.network, &created.id).await?;
        self.client.start_container(&created.id).await?;
        self.client
            .disconnect_network(&spec.detach_network, &created.id, false)
            .await?;

        info!(id = %created.id, network = %spec.network, "Workload container started");
        Ok(created.id)
    }
}

/// Connects to the engine named by an endpoint URL.
#[derive(Debug, Clone, Default)]
pub struct EngineConnector;

impl RuntimeConnector for EngineConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn ContainerRuntime>, DeployError> {
        let client = EngineClient::from_endpoint_url(&endpoint.url)?;
        Ok(Arc::new(EngineRuntime::new(client)))
    }
}
