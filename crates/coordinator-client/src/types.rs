//! Coordinator manifest and secret payload types.
//!
//! Field names follow the coordinator's JSON schema (PascalCase). All maps are
//! ordered so that serializing the same manifest always yields the same bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Trust manifest as accepted by the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Manifest {
    #[serde(default)]
    pub packages: BTreeMap<String, Package>,

    #[serde(default)]
    pub marbles: BTreeMap<String, Marble>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub users: BTreeMap<String, User>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub roles: BTreeMap<String, Role>,

    #[serde(default)]
    pub secrets: BTreeMap<String, SecretDefinition>,
}

impl Manifest {
    /// Merge packages, marbles and secrets from `other`, overwriting existing keys.
    ///
    /// Users and roles are left untouched; they are only ever seeded once.
    pub fn merge(&mut self, other: &Manifest) {
        for (name, package) in &other.packages {
            self.packages.insert(name.clone(), package.clone());
        }
        for (name, marble) in &other.marbles {
            self.marbles.insert(name.clone(), marble.clone());
        }
        for (name, secret) in &other.secrets {
            self.secrets.insert(name.clone(), secret.clone());
        }
    }
}

/// Enclave package identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Enclave measurement (MRENCLAVE).
    #[serde(rename = "UniqueID", default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    /// Enclave signer (MRSIGNER).
    #[serde(rename = "SignerID", default, skip_serializing_if = "Option::is_none")]
    pub signer_id: Option<String>,

    #[serde(rename = "ProductID", default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u64>,

    #[serde(rename = "SecurityVersion", default, skip_serializing_if = "Option::is_none")]
    pub security_version: Option<u64>,

    #[serde(rename = "Debug", default)]
    pub debug: bool,
}

/// One deployable enclave instance bound to a package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Marble {
    pub package: String,

    #[serde(default)]
    pub parameters: MarbleParameters,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MarbleParameters {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub argv: Vec<String>,
}

/// Manifest user authenticated by client certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    /// PEM-encoded certificate.
    pub certificate: String,

    #[serde(default)]
    pub roles: Vec<String>,
}

/// Permission set granted to users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Role {
    pub resource_type: String,

    /// `None` grants the role on every resource of the type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_names: Option<Vec<String>>,

    #[serde(default)]
    pub actions: Vec<String>,
}

/// Secret constraint declared in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecretDefinition {
    #[serde(rename = "Type")]
    pub secret_type: String,

    /// Key size in bits for generated key material.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,

    /// The value is supplied by a user through the secrets endpoint.
    #[serde(default)]
    pub user_defined: bool,
}

impl SecretDefinition {
    /// User-supplied opaque value.
    pub fn plain() -> Self {
        Self {
            secret_type: "plain".into(),
            size: None,
            user_defined: true,
        }
    }

    /// User-supplied symmetric key of `bits` bits.
    pub fn symmetric_key(bits: u32) -> Self {
        Self {
            secret_type: "symmetric-key".into(),
            size: Some(bits),
            user_defined: true,
        }
    }
}

/// Value submitted for a user-defined secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretValue {
    /// Base64-encoded secret bytes.
    #[serde(rename = "Key")]
    pub key: String,
}

/// Secret name to value, as posted to the secrets endpoint.
pub type SecretPayload = BTreeMap<String, SecretValue>;

/// Coordinator path a manifest is submitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestPath {
    /// First manifest for a coordinator.
    Bootstrap,
    /// Incremental update of an already-initialized coordinator.
    Update,
}

impl ManifestPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestPath::Bootstrap => "manifest",
            ManifestPath::Update => "update",
        }
    }
}

impl fmt::Display for ManifestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
