//! Bootstrap-vs-update decision and staged commit of the per-endpoint record.

use super::builder::ManifestFragment;
use crate::error::DeployError;
use crate::store::Repository;
use crate::trust::TrustBootstrapper;
use crate::types::{CoordinatorDeployment, ManifestState};
use coordinator_client::{Manifest, ManifestPath, Role, User};
use tracing::{error, info};

/// Role allowed to bump package security versions.
pub const UPDATE_PACKAGE_ROLE: &str = "updatePackage";

/// Role allowed to read and write user-defined secrets.
pub const SECRET_MANAGER_ROLE: &str = "secretManager";

/// Client credentials and trust anchor for one coordinator session.
#[derive(Clone)]
pub struct TrustMaterial {
    pub root_cert: Option<String>,
    pub user_cert: String,
    pub user_private_key: String,
}

/// Chooses the bootstrap or update path for an endpoint's record.
#[derive(Clone)]
pub struct ManifestLifecycle {
    bootstrapper: TrustBootstrapper,
}

impl ManifestLifecycle {
    pub fn new(bootstrapper: TrustBootstrapper) -> Self {
        Self { bootstrapper }
    }

    /// Stage the transition of `current` for one deployment.
    pub fn plan(
        &self,
        current: CoordinatorDeployment,
        fragment: &ManifestFragment,
    ) -> Result<LifecyclePlan, DeployError> {
        LifecyclePlan::prepare(current, fragment, &self.bootstrapper)
    }
}

/// A staged transition of a [`CoordinatorDeployment`].
///
/// Nothing is persisted until [`LifecyclePlan::commit`].
#[derive(Debug)]
pub struct LifecyclePlan {
    staged: CoordinatorDeployment,
    path: ManifestPath,
    submission: Manifest,
}

impl LifecyclePlan {
    /// Start the transition for `current` with the deployment's fragment.
    ///
    /// An uninitialized record is bootstrapped: credentials are issued and the
    /// admin user and roles are seeded. An initialized record only has the
    /// fragment merged in.
    pub fn prepare(
        current: CoordinatorDeployment,
        fragment: &ManifestFragment,
        bootstrapper: &TrustBootstrapper,
    ) -> Result<Self, DeployError> {
        let mut staged = current;
        let update = fragment.to_manifest();

        match staged.state {
            ManifestState::Uninitialized => {
                let creds = bootstrapper.bootstrap()?;

                let mut manifest = seed_manifest(bootstrapper.subject(), &creds.cert_pem);
                manifest.merge(&update);

                staged.user_cert = Some(creds.cert_pem);
                staged.user_private_key = Some(creds.key_pem);
                staged.manifest = manifest.clone();
                staged.state = ManifestState::Initialized;

                info!(endpoint_id = staged.endpoint_id, "Bootstrapping coordinator manifest");

                Ok(Self {
                    staged,
                    path: ManifestPath::Bootstrap,
                    submission: manifest,
                })
            }
            ManifestState::Initialized => {
                if staged.user_cert.is_none() || staged.user_private_key.is_none() {
                    return Err(DeployError::TrustBootstrapFailed(format!(
                        "endpoint {} is initialized but has no client credentials",
                        staged.endpoint_id
                    )));
                }

                staged.manifest.merge(&update);

                info!(
                    endpoint_id = staged.endpoint_id,
                    package = %fragment.package_name,
                    "Updating coordinator manifest"
                );

                Ok(Self {
                    staged,
                    path: ManifestPath::Update,
                    submission: update,
                })
            }
        }
    }

    /// Coordinator path the submission goes to.
    pub fn path(&self) -> ManifestPath {
        self.path
    }

    /// Document to submit: the full seeded manifest on bootstrap, the fragment on update.
    pub fn submission(&self) -> &Manifest {
        &self.submission
    }

    pub fn is_bootstrap(&self) -> bool {
        self.path == ManifestPath::Bootstrap
    }

    /// The record as it will look once committed.
    pub fn staged(&self) -> &CoordinatorDeployment {
        &self.staged
    }

    /// Credentials for the coordinator session of this transition.
    pub fn trust(&self) -> Result<TrustMaterial, DeployError> {
        match (&self.staged.user_cert, &self.staged.user_private_key) {
            (Some(cert), Some(key)) => Ok(TrustMaterial {
                root_cert: self.staged.root_cert.clone(),
                user_cert: cert.clone(),
                user_private_key: key.clone(),
            }),
            _ => Err(DeployError::TrustBootstrapFailed(
                "no client credentials staged".into(),
            )),
        }
    }

    /// Persist the staged record.
    ///
    /// Call only after the coordinator accepted both the manifest and the
    /// secrets. A failure here leaves the coordinator ahead of the local record.
    pub async fn commit(
        self,
        repository: &dyn Repository<CoordinatorDeployment>,
    ) -> Result<CoordinatorDeployment, DeployError> {
        let key = self.staged.endpoint_id.to_string();

        if let Err(e) = repository.update(&key, &self.staged).await {
            error!(
                endpoint_id = self.staged.endpoint_id,
                path = %self.path,
                error = %e,
                "Coordinator accepted the manifest but the local record could not be saved; \
                 coordinator and local state now differ"
            );
            return Err(e.into());
        }

        Ok(self.staged)
    }
}

/// Manifest holding only the admin user and its two roles.
fn seed_manifest(admin: &str, cert_pem: &str) -> Manifest {
    let mut manifest = Manifest::default();

    manifest.users.insert(
        admin.to_string(),
        User {
            certificate: cert_pem.to_string(),
            roles: vec![UPDATE_PACKAGE_ROLE.into(), SECRET_MANAGER_ROLE.into()],
        },
    );

    manifest.roles.insert(
        UPDATE_PACKAGE_ROLE.into(),
        Role {
            resource_type: "Packages".into(),
            resource_names: None,
            actions: vec!["UpdateSecurityVersion".into()],
        },
    );

    manifest.roles.insert(
        SECRET_MANAGER_ROLE.into(),
        Role {
            resource_type: "Secrets".into(),
            resource_names: Some(Vec::new()),
            actions: vec!["ReadSecret".into(), "WriteSecret".into()],
        },
    );

    manifest
}
