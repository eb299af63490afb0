//! Builds the manifest fragment contributed by one deployment.

use crate::identity::EnclaveIdentity;
use crate::types::{DeploymentRequest, InputType, SecretSource, Template};
use coordinator_client::{Manifest, Marble, MarbleParameters, Package, SecretDefinition};
use serde::Serialize;
use std::collections::BTreeMap;

/// Key size of generated protected-file keys, in bits.
pub const FILE_KEY_BITS: u32 = 128;

/// Package, marble and secret declarations for a single deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestFragment {
    pub package_name: String,
    pub package: Package,
    pub marble_name: String,
    pub marble: Marble,
    pub secrets: BTreeMap<String, SecretDefinition>,
}

impl ManifestFragment {
    /// The fragment as a standalone (update) manifest.
    pub fn to_manifest(&self) -> Manifest {
        let mut manifest = Manifest::default();
        manifest
            .packages
            .insert(self.package_name.clone(), self.package.clone());
        manifest
            .marbles
            .insert(self.marble_name.clone(), self.marble.clone());
        manifest.secrets = self.secrets.clone();
        manifest
    }
}

/// Build the fragment for `request`. Pure: equal inputs give equal fragments.
pub fn build_fragment(
    template: &Template,
    request: &DeploymentRequest,
    identity: &EnclaveIdentity,
) -> ManifestFragment {
    let mut secrets = BTreeMap::new();

    for (name, source) in &template.secrets {
        let definition = match source {
            SecretSource::Generate => SecretDefinition::symmetric_key(FILE_KEY_BITS),
            SecretSource::Literal(_) => SecretDefinition::plain(),
        };
        secrets.insert(name.clone(), definition);
    }

    for input in template.inputs_of(InputType::Volume) {
        if let Some(name) = &input.secret_name {
            secrets.insert(name.clone(), SecretDefinition::symmetric_key(FILE_KEY_BITS));
        }
    }

    let env = secrets
        .keys()
        .map(|name| (env_var_name(name), format!("{{{{ raw .Secrets.{} }}}}", name)))
        .collect();

    let package = Package {
        unique_id: Some(identity.measurement.clone()),
        signer_id: Some(identity.signer.clone()),
        product_id: None,
        security_version: None,
        debug: false,
    };

    let marble = Marble {
        package: request.name.clone(),
        parameters: MarbleParameters {
            env,
            ..Default::default()
        },
    };

    ManifestFragment {
        package_name: request.name.clone(),
        package,
        marble_name: request.marble_name(),
        marble,
        secrets,
    }
}

/// `db-password` -> `DB_PASSWORD`.
fn env_var_name(secret: &str) -> String {
    secret
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
