//! Records read and written by the orchestrator.

use coordinator_client::Manifest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Template secret value meaning "generate a fresh file-encryption key".
pub const GENERATE_KEY_SENTINEL: &str = "RANDOM_KEY";

/// Kind of value a template input collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InputType {
    Plain,
    Secret,
    Volume,
    Port,
}

/// One user-supplied field declared by a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateInput {
    pub label: String,

    #[serde(rename = "type")]
    pub input_type: InputType,

    /// Secret this input feeds (SECRET and VOLUME inputs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,

    /// Placeholder replaced by the user value inside the secret literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_pattern: Option<String>,

    /// Container-side port (PORT inputs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_container: Option<String>,

    /// `tcp` or `udp` (PORT inputs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_type: Option<String>,
}

/// Where a template secret's value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SecretSource {
    /// A fresh key from the file-key generator.
    Generate,
    /// Literal text with input placeholders.
    Literal(String),
}

impl From<String> for SecretSource {
    fn from(value: String) -> Self {
        if value == GENERATE_KEY_SENTINEL {
            SecretSource::Generate
        } else {
            SecretSource::Literal(value)
        }
    }
}

impl From<SecretSource> for String {
    fn from(source: SecretSource) -> Self {
        match source {
            SecretSource::Generate => GENERATE_KEY_SENTINEL.to_string(),
            SecretSource::Literal(value) => value,
        }
    }
}

/// Deployable workload definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: u64,

    #[serde(default)]
    pub name: String,

    /// Image reference, e.g. `registry/app:1.0`.
    pub image: String,

    #[serde(default)]
    pub inputs: Vec<TemplateInput>,

    #[serde(default)]
    pub secrets: BTreeMap<String, SecretSource>,
}

impl Template {
    /// Inputs of the given type, in declaration order.
    pub fn inputs_of(&self, input_type: InputType) -> impl Iterator<Item = &TemplateInput> {
        self.inputs
            .iter()
            .filter(move |input| input.input_type == input_type)
    }
}

/// Request to deploy a template onto an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub template_id: u64,
    pub endpoint_id: u64,

    /// Deployment name; keys the package, the marble and the container.
    pub name: String,

    /// Input label to user value.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
}

impl DeploymentRequest {
    pub fn marble_name(&self) -> String {
        marble_name(&self.name)
    }

    pub fn input(&self, label: &str) -> Option<&str> {
        self.inputs.get(label).map(String::as_str)
    }
}

/// Marble entry name for a deployment.
pub fn marble_name(deployment: &str) -> String {
    format!("{}_marble", deployment)
}

/// Container engine environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: u64,

    #[serde(default)]
    pub name: String,

    /// Engine URL: `unix:///var/run/docker.sock` or `tcp://host:port`.
    pub url: String,
}

impl Endpoint {
    /// Host running the engine (and the coordinator). Local socket endpoints map to loopback.
    pub fn host(&self) -> String {
        reqwest::Url::parse(&self.url)
            .ok()
            // IPv6 hosts come back bracketed, which the resolver rejects.
            .and_then(|url| {
                url.host_str()
                    .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
            })
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }
}

/// Protected-file key created alongside an encrypted volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub id: u64,

    /// Base64-encoded key material.
    pub pf_key: String,
}

/// Whether the coordinator of an endpoint already holds a manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestState {
    #[default]
    Uninitialized,
    Initialized,
}

/// Per-endpoint coordinator trust state.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorDeployment {
    pub endpoint_id: u64,

    #[serde(default)]
    pub state: ManifestState,

    #[serde(default)]
    pub manifest: Manifest,

    /// Coordinator root certificate (PEM).
    #[serde(default)]
    pub root_cert: Option<String>,

    /// Orchestrator client certificate (PEM).
    #[serde(default)]
    pub user_cert: Option<String>,

    /// Orchestrator client private key (PEM).
    #[serde(default)]
    pub user_private_key: Option<String>,
}

impl CoordinatorDeployment {
    /// Zero-value record for an endpoint that has never been deployed to.
    pub fn new(endpoint_id: u64) -> Self {
        Self {
            endpoint_id,
            ..Default::default()
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state == ManifestState::Initialized
    }

    /// Copy safe to return over the API.
    pub fn redacted(&self) -> Self {
        Self {
            user_private_key: self.user_private_key.as_ref().map(|_| "<redacted>".into()),
            ..self.clone()
        }
    }
}

impl fmt::Debug for CoordinatorDeployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinatorDeployment")
            .field("endpoint_id", &self.endpoint_id)
            .field("state", &self.state)
            .field("manifest", &self.manifest)
            .field("root_cert", &self.root_cert.is_some())
            .field("user_cert", &self.user_cert.is_some())
            .field("user_private_key", &self.user_private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Result of a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentOutcome {
    pub container_id: String,
    pub marble: String,
    /// The coordinator received its first manifest in this deployment.
    pub bootstrapped: bool,
}
