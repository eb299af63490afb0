//! Docker Engine API types.
//!
//! Only the fields needed to provision a confidential workload are modelled;
//! everything else the engine returns is ignored.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result of `GET /images/{name}/json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageInspect {
    #[serde(rename = "Id", default)]
    pub id: Option<String>,

    #[serde(rename = "Config", default)]
    pub config: Option<ImageConfig>,
}

/// Image configuration block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageConfig {
    /// Raw label values. Kept as JSON values so callers can reject non-string labels.
    #[serde(rename = "Labels", default)]
    pub labels: Option<HashMap<String, serde_json::Value>>,
}

impl ImageInspect {
    /// Image labels, empty when the image declares none.
    pub fn labels(&self) -> HashMap<String, serde_json::Value> {
        self.config
            .as_ref()
            .and_then(|c| c.labels.clone())
            .unwrap_or_default()
    }
}

/// Result of `GET /volumes/{name}`.
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeInspect {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Labels", default)]
    pub labels: Option<HashMap<String, String>>,
}

/// Body of `POST /containers/create`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerCreateBody {
    pub image: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,

    /// Keys are `<port>/<proto>`; values are always empty objects.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub exposed_ports: HashMap<String, EmptyObject>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub domainname: Option<String>,

    pub host_config: HostConfig,
}

/// Serializes as `{}`.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct EmptyObject {}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub port_bindings: HashMap<String, Vec<PortBinding>>,

    pub publish_all_ports: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceMapping>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PortBinding {
    #[serde(rename = "HostIp")]
    pub host_ip: String,
    #[serde(rename = "HostPort")]
    pub host_port: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Mount {
    #[serde(rename = "Type")]
    pub mount_type: String,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceMapping {
    pub path_on_host: String,
    pub path_in_container: String,
    pub cgroup_permissions: String,
}

/// Result of `POST /containers/create`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerCreateResponse {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "Warnings", default)]
    pub warnings: Option<Vec<String>>,
}

/// Body of network connect / disconnect calls.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct NetworkMembership<'a> {
    #[serde(rename = "Container")]
    pub container: &'a str,
    #[serde(rename = "Force", skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
}

/// Error body returned by the engine on failure.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EngineMessage {
    pub message: String,
}
