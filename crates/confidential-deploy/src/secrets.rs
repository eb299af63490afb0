//! Resolution of template secrets into values the coordinator accepts.

use crate::error::DeployError;
use crate::keygen::FileKeyGenerator;
use crate::runtime::ContainerRuntime;
use crate::store::Repository;
use crate::types::{DeploymentRequest, InputType, KeyRecord, SecretSource, Template};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use coordinator_client::{SecretPayload, SecretValue};
use std::sync::Arc;
use tracing::debug;

/// Volume label holding the id of the volume's protected-file key.
pub const KEY_ID_LABEL: &str = "pfEncryptionKeyId";

/// Computes the secret payload for one deployment.
#[derive(Clone)]
pub struct SecretProvisioner {
    keygen: Arc<dyn FileKeyGenerator>,
    keys: Arc<dyn Repository<KeyRecord>>,
}

impl SecretProvisioner {
    pub fn new(keygen: Arc<dyn FileKeyGenerator>, keys: Arc<dyn Repository<KeyRecord>>) -> Self {
        Self { keygen, keys }
    }

    /// Resolve every template secret and every volume key.
    ///
    /// Values are base64; volume keys are stored base64 already and pass
    /// through unchanged.
    pub async fn resolve(
        &self,
        template: &Template,
        request: &DeploymentRequest,
        runtime: &dyn ContainerRuntime,
    ) -> Result<SecretPayload, DeployError> {
        let mut payload = SecretPayload::new();

        for (name, source) in &template.secrets {
            let encoded = match source {
                SecretSource::Generate => BASE64.encode(self.keygen.generate().await?),
                SecretSource::Literal(text) => {
                    BASE64.encode(substitute(text, name, template, request))
                }
            };
            payload.insert(name.clone(), SecretValue { key: encoded });
        }

        for input in template.inputs_of(InputType::Volume) {
            let secret_name = input.secret_name.as_deref().ok_or_else(|| {
                DeployError::Validation(format!("volume input {} has no secret name", input.label))
            })?;
            let volume = request.input(&input.label).ok_or_else(|| {
                DeployError::Validation(format!("values missing for inputs: {}", input.label))
            })?;

            let key = self.volume_key(volume, runtime).await?;
            payload.insert(secret_name.to_string(), SecretValue { key: key.pf_key });
        }

        debug!(count = payload.len(), "Resolved secrets");
        Ok(payload)
    }

    async fn volume_key(
        &self,
        volume: &str,
        runtime: &dyn ContainerRuntime,
    ) -> Result<KeyRecord, DeployError> {
        let labels = runtime.volume_labels(volume).await.map_err(|e| match e {
            DeployError::VolumeInspectionFailed(_) => e,
            other => DeployError::VolumeInspectionFailed(format!("{}: {}", volume, other)),
        })?;

        let key_id = labels
            .get(KEY_ID_LABEL)
            .ok_or_else(|| {
                DeployError::VolumeInspectionFailed(format!(
                    "volume {} has no {} label",
                    volume, KEY_ID_LABEL
                ))
            })?
            .trim()
            .parse::<u64>()
            .map_err(|_| {
                DeployError::VolumeInspectionFailed(format!(
                    "volume {} has a non-numeric {} label",
                    volume, KEY_ID_LABEL
                ))
            })?;

        self.keys
            .get(&key_id.to_string())
            .await?
            .ok_or_else(|| DeployError::KeyNotFound(format!("key {} for volume {}", key_id, volume)))
    }
}

/// Replace every SECRET input's pattern bound to `secret` with the user value.
fn substitute(text: &str, secret: &str, template: &Template, request: &DeploymentRequest) -> String {
    let mut value = text.to_string();

    for input in template.inputs_of(InputType::Secret) {
        if input.secret_name.as_deref() != Some(secret) {
            continue;
        }
        let (Some(pattern), Some(user_value)) =
            (input.replace_pattern.as_deref(), request.input(&input.label))
        else {
            continue;
        };
        if !pattern.is_empty() {
            value = value.replace(pattern, user_value);
        }
    }

    value
}
