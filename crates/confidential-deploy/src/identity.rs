//! Enclave identity extraction from image labels.

use crate::error::DeployError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Image label carrying the enclave measurement.
pub const MEASUREMENT_LABEL: &str = "pcc.mrenclave";

/// Image label carrying the enclave signer.
pub const SIGNER_LABEL: &str = "pcc.mrsigner";

/// Measurement and signer of the trusted code inside an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnclaveIdentity {
    pub measurement: String,
    pub signer: String,
}

impl EnclaveIdentity {
    /// Read both identity labels; either one missing or non-string is fatal.
    pub fn from_labels(labels: &HashMap<String, serde_json::Value>) -> Result<Self, DeployError> {
        Ok(Self {
            measurement: string_label(labels, MEASUREMENT_LABEL)?,
            signer: string_label(labels, SIGNER_LABEL)?,
        })
    }
}

fn string_label(
    labels: &HashMap<String, serde_json::Value>,
    name: &str,
) -> Result<String, DeployError> {
    match labels.get(name) {
        Some(serde_json::Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(DeployError::IdentityMissing(format!(
            "{} is not a string",
            name
        ))),
        None => Err(DeployError::IdentityMissing(name.to_string())),
    }
}
