//! End-to-end deployment of a confidential template.

use crate::config::{Config, KeygenBackend};
use crate::coordinator::{CoordinatorConnector, MtlsConnector};
use crate::error::DeployError;
use crate::identity::EnclaveIdentity;
use crate::keygen::{FileKeyGenerator, PfCryptKeyGenerator, RandomKeyGenerator};
use crate::manifest::{build_fragment, ManifestLifecycle};
use crate::runtime::{build_container_spec, ContainerSettings, EngineConnector, RuntimeConnector};
use crate::secrets::SecretProvisioner;
use crate::store::DataStore;
use crate::template::validate_request;
use crate::trust::{SelfSignedIssuer, TrustBootstrapper};
use crate::types::{CoordinatorDeployment, DeploymentOutcome, DeploymentRequest, Endpoint, Template};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, instrument};

/// One lock per endpoint, serializing manifest transitions.
#[derive(Debug, Clone, Default)]
pub struct EndpointLocks {
    locks: Arc<Mutex<HashMap<u64, Arc<Mutex<()>>>>>,
}

impl EndpointLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `endpoint_id`'s coordinator record.
    pub async fn acquire(&self, endpoint_id: u64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(endpoint_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Drives a deployment from request to running container.
pub struct Orchestrator {
    store: DataStore,
    runtimes: Arc<dyn RuntimeConnector>,
    coordinators: Arc<dyn CoordinatorConnector>,
    lifecycle: ManifestLifecycle,
    secrets: SecretProvisioner,
    containers: ContainerSettings,
    locks: EndpointLocks,
}

impl Orchestrator {
    pub fn new(
        store: DataStore,
        runtimes: Arc<dyn RuntimeConnector>,
        coordinators: Arc<dyn CoordinatorConnector>,
        keygen: Arc<dyn FileKeyGenerator>,
        bootstrapper: TrustBootstrapper,
        containers: ContainerSettings,
    ) -> Self {
        let secrets = SecretProvisioner::new(keygen, store.keys.clone());
        Self {
            store,
            runtimes,
            coordinators,
            lifecycle: ManifestLifecycle::new(bootstrapper),
            secrets,
            containers,
            locks: EndpointLocks::new(),
        }
    }

    /// Production wiring: Docker Engine endpoints, mTLS coordinator sessions
    /// and self-signed client certificates.
    pub fn from_config(config: &Config, store: DataStore) -> Self {
        let keygen: Arc<dyn FileKeyGenerator> = match config.keygen.backend {
            KeygenBackend::PfCrypt => {
                Arc::new(PfCryptKeyGenerator::new(config.keygen.pf_crypt_binary.clone()))
            }
            KeygenBackend::Random => Arc::new(RandomKeyGenerator),
        };

        let bootstrapper = TrustBootstrapper::new(
            Arc::new(SelfSignedIssuer::new(config.coordinator.cert_validity_days)),
            config.coordinator.admin_user.clone(),
        );

        Self::new(
            store,
            Arc::new(EngineConnector),
            Arc::new(MtlsConnector::new(config.coordinator_settings())),
            keygen,
            bootstrapper,
            config.container_settings(),
        )
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    /// Deploy `request` and register it with the endpoint's coordinator.
    ///
    /// The coordinator record is only written after the coordinator accepted
    /// both the manifest and the secrets.
    #[instrument(skip(self, request), fields(template_id = request.template_id, endpoint_id = request.endpoint_id, name = %request.name))]
    pub async fn deploy(&self, request: &DeploymentRequest) -> Result<DeploymentOutcome, DeployError> {
        let template = self.template(request.template_id).await?;
        validate_request(&template, request)?;
        let endpoint = self.endpoint(request.endpoint_id).await?;
        let spec = build_container_spec(&template, request, &self.containers)?;

        let runtime = self.runtimes.connect(&endpoint)?;
        let labels = runtime.pull_image(&template.image).await?;
        let identity = EnclaveIdentity::from_labels(&labels)?;
        let fragment = build_fragment(&template, request, &identity);

        // Secrets resolve before the coordinator is contacted.
        let payload = self.secrets.resolve(&template, request, runtime.as_ref()).await?;

        let bootstrapped = {
            let _guard = self.locks.acquire(endpoint.id).await;

            let current = self
                .store
                .deployments
                .get(&endpoint.id.to_string())
                .await?
                .unwrap_or_else(|| CoordinatorDeployment::new(endpoint.id));

            let plan = self.lifecycle.plan(current, &fragment)?;
            let coordinator = self.coordinators.connect(&endpoint, &plan.trust()?).await?;

            coordinator
                .submit_manifest(plan.path(), plan.submission())
                .await?;

            coordinator.submit_secrets(&payload).await?;

            let bootstrapped = plan.is_bootstrap();
            plan.commit(self.store.deployments.as_ref()).await?;
            bootstrapped
        };

        let container_id = runtime.provision(&spec).await?;

        info!(
            container_id = %container_id,
            marble = %fragment.marble_name,
            bootstrapped,
            "Confidential workload deployed"
        );

        Ok(DeploymentOutcome {
            container_id,
            marble: fragment.marble_name,
            bootstrapped,
        })
    }

    /// Record the coordinator root certificate for an endpoint.
    #[instrument(skip(self, root_cert))]
    pub async fn set_root_cert(
        &self,
        endpoint_id: u64,
        root_cert: String,
    ) -> Result<CoordinatorDeployment, DeployError> {
        if !root_cert.contains("-----BEGIN CERTIFICATE-----") {
            return Err(DeployError::Validation(
                "root certificate must be PEM encoded".into(),
            ));
        }

        let _guard = self.locks.acquire(endpoint_id).await;

        let key = endpoint_id.to_string();
        let mut deployment = self
            .store
            .deployments
            .get(&key)
            .await?
            .unwrap_or_else(|| CoordinatorDeployment::new(endpoint_id));
        deployment.root_cert = Some(root_cert);
        self.store.deployments.update(&key, &deployment).await?;

        info!("Stored coordinator root certificate");
        Ok(deployment.redacted())
    }

    /// Coordinator record of an endpoint, private key redacted.
    pub async fn coordinator_deployment(
        &self,
        endpoint_id: u64,
    ) -> Result<CoordinatorDeployment, DeployError> {
        self.store
            .deployments
            .get(&endpoint_id.to_string())
            .await?
            .map(|d| d.redacted())
            .ok_or_else(|| {
                DeployError::Lookup(format!("no coordinator deployment for endpoint {}", endpoint_id))
            })
    }

    async fn template(&self, id: u64) -> Result<Template, DeployError> {
        self.store
            .templates
            .get(&id.to_string())
            .await?
            .ok_or_else(|| DeployError::Lookup(format!("template {}", id)))
    }

    async fn endpoint(&self, id: u64) -> Result<Endpoint, DeployError> {
        self.store
            .endpoints
            .get(&id.to_string())
            .await?
            .ok_or_else(|| DeployError::Lookup(format!("endpoint {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Coordinator;
    use crate::identity::{MEASUREMENT_LABEL, SIGNER_LABEL};
    use crate::keygen::MockFileKeyGenerator;
    use crate::manifest::TrustMaterial;
    use crate::runtime::{ContainerRuntime, MockContainerRuntime, MockRuntimeConnector};
    use crate::types::{InputType, ManifestState, SecretSource, TemplateInput};
    use async_trait::async_trait;
    use coordinator_client::{Manifest, ManifestPath, SecretPayload};
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;

    /// Coordinator double recording every submission.
    #[derive(Default)]
    struct RecordingCoordinator {
        manifests: StdMutex<Vec<(ManifestPath, Manifest)>>,
        secrets: StdMutex<Vec<SecretPayload>>,
        reject_manifest: bool,
    }

    #[async_trait]
    impl Coordinator for RecordingCoordinator {
        async fn submit_manifest(
            &self,
            path: ManifestPath,
            manifest: &Manifest,
        ) -> Result<(), DeployError> {
            if self.reject_manifest {
                return Err(DeployError::CoordinatorRejected {
                    status: 400,
                    body: "manifest invalid".into(),
                });
            }
            self.manifests
                .lock()
                .unwrap()
                .push((path, manifest.clone()));
            Ok(())
        }

        async fn submit_secrets(&self, secrets: &SecretPayload) -> Result<(), DeployError> {
            self.secrets.lock().unwrap().push(secrets.clone());
            Ok(())
        }
    }

    struct FixedConnector(Arc<RecordingCoordinator>);

    #[async_trait]
    impl CoordinatorConnector for FixedConnector {
        async fn connect(
            &self,
            _endpoint: &Endpoint,
            trust: &TrustMaterial,
        ) -> Result<Arc<dyn Coordinator>, DeployError> {
            assert!(trust.user_cert.contains("BEGIN CERTIFICATE"));
            Ok(self.0.clone())
        }
    }

    fn template() -> Template {
        let mut secrets = BTreeMap::new();
        secrets.insert("s1".to_string(), SecretSource::Literal("token=<<X>>".into()));

        Template {
            id: 1,
            name: "web".into(),
            image: "w:1".into(),
            inputs: vec![
                TemplateInput {
                    label: "PORT".into(),
                    input_type: InputType::Port,
                    secret_name: None,
                    replace_pattern: None,
                    port_container: Some("8080".into()),
                    port_type: Some("tcp".into()),
                },
                TemplateInput {
                    label: "TOK".into(),
                    input_type: InputType::Secret,
                    secret_name: Some("s1".into()),
                    replace_pattern: Some("<<X>>".into()),
                    port_container: None,
                    port_type: None,
                },
            ],
            secrets,
        }
    }

    fn request(name: &str, inputs: &[(&str, &str)]) -> DeploymentRequest {
        DeploymentRequest {
            template_id: 1,
            endpoint_id: 5,
            name: name.into(),
            inputs: inputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    async fn seeded_store() -> DataStore {
        let store = DataStore::memory();
        store.templates.update("1", &template()).await.unwrap();
        store
            .endpoints
            .update(
                "5",
                &Endpoint {
                    id: 5,
                    name: "edge".into(),
                    url: "tcp://10.0.0.5:2375".into(),
                },
            )
            .await
            .unwrap();
        store
    }

    fn identity_labels() -> HashMap<String, serde_json::Value> {
        [
            (MEASUREMENT_LABEL.to_string(), serde_json::json!("aa")),
            (SIGNER_LABEL.to_string(), serde_json::json!("bb")),
        ]
        .into_iter()
        .collect()
    }

    fn enclave_runtime() -> MockContainerRuntime {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_pull_image()
            .returning(|_| Ok(identity_labels()));
        runtime
            .expect_provision()
            .returning(|spec| Ok(format!("{}-id", spec.name)));
        runtime
    }

    fn connector_for(runtime: MockContainerRuntime) -> Arc<dyn RuntimeConnector> {
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(runtime);
        let mut connector = MockRuntimeConnector::new();
        connector
            .expect_connect()
            .returning(move |_| Ok(runtime.clone()));
        Arc::new(connector)
    }

    fn unused_runtimes() -> Arc<dyn RuntimeConnector> {
        let mut connector = MockRuntimeConnector::new();
        connector.expect_connect().times(0);
        Arc::new(connector)
    }

    fn unused_keygen() -> Arc<dyn FileKeyGenerator> {
        let mut keygen = MockFileKeyGenerator::new();
        keygen.expect_generate().times(0);
        Arc::new(keygen)
    }

    fn orchestrator(
        store: DataStore,
        runtimes: Arc<dyn RuntimeConnector>,
        coordinator: Arc<RecordingCoordinator>,
    ) -> Orchestrator {
        Orchestrator::new(
            store,
            runtimes,
            Arc::new(FixedConnector(coordinator)),
            unused_keygen(),
            TrustBootstrapper::new(Arc::new(SelfSignedIssuer::new(30)), "portainer"),
            ContainerSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_first_deployment_bootstraps() {
        let store = seeded_store().await;
        let coordinator = Arc::new(RecordingCoordinator::default());
        let orchestrator = orchestrator(
            store.clone(),
            connector_for(enclave_runtime()),
            coordinator.clone(),
        );

        let outcome = orchestrator
            .deploy(&request("app", &[("PORT", "9090"), ("TOK", "abc")]))
            .await
            .unwrap();

        assert_eq!(outcome.container_id, "app-id");
        assert_eq!(outcome.marble, "app_marble");
        assert!(outcome.bootstrapped);

        let manifests = coordinator.manifests.lock().unwrap().clone();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].0, ManifestPath::Bootstrap);
        assert!(manifests[0].1.users.contains_key("portainer"));

        let secrets = coordinator.secrets.lock().unwrap().clone();
        assert_eq!(secrets[0]["s1"].key, "dG9rZW49YWJj");

        let stored = store.deployments.get("5").await.unwrap().unwrap();
        assert_eq!(stored.state, ManifestState::Initialized);
        assert!(stored.manifest.packages.contains_key("app"));
        assert!(stored.manifest.marbles.contains_key("app_marble"));
        assert!(stored.user_cert.is_some());
        assert!(stored.user_private_key.is_some());
    }

    #[tokio::test]
    async fn test_second_deployment_updates() {
        let store = seeded_store().await;
        let coordinator = Arc::new(RecordingCoordinator::default());
        let orchestrator = orchestrator(
            store.clone(),
            connector_for(enclave_runtime()),
            coordinator.clone(),
        );

        orchestrator
            .deploy(&request("app", &[("PORT", "9090"), ("TOK", "abc")]))
            .await
            .unwrap();
        let first_cert = store.deployments.get("5").await.unwrap().unwrap().user_cert;

        let outcome = orchestrator
            .deploy(&request("api", &[("PORT", "9091"), ("TOK", "xyz")]))
            .await
            .unwrap();
        assert!(!outcome.bootstrapped);

        let manifests = coordinator.manifests.lock().unwrap().clone();
        assert_eq!(manifests[1].0, ManifestPath::Update);
        assert!(manifests[1].1.users.is_empty());

        let stored = store.deployments.get("5").await.unwrap().unwrap();
        assert_eq!(stored.user_cert, first_cert);
        assert_eq!(stored.manifest.users.len(), 1);
        assert_eq!(stored.manifest.packages.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_deployments_bootstrap_once() {
        let store = seeded_store().await;
        let coordinator = Arc::new(RecordingCoordinator::default());
        let orchestrator = Arc::new(orchestrator(
            store.clone(),
            connector_for(enclave_runtime()),
            coordinator.clone(),
        ));

        let a = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .deploy(&request("one", &[("PORT", "9090"), ("TOK", "a")]))
                    .await
            })
        };
        let b = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .deploy(&request("two", &[("PORT", "9091"), ("TOK", "b")]))
                    .await
            })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert!(a.bootstrapped ^ b.bootstrapped);

        let manifests = coordinator.manifests.lock().unwrap().clone();
        let bootstraps = manifests
            .iter()
            .filter(|(path, _)| *path == ManifestPath::Bootstrap)
            .count();
        assert_eq!(bootstraps, 1);

        let stored = store.deployments.get("5").await.unwrap().unwrap();
        assert_eq!(stored.manifest.packages.len(), 2);
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_network_call() {
        let store = seeded_store().await;
        let coordinator = Arc::new(RecordingCoordinator::default());
        let orchestrator = orchestrator(store.clone(), unused_runtimes(), coordinator.clone());

        let result = orchestrator.deploy(&request("app", &[("PORT", "9090")])).await;

        assert!(matches!(result, Err(DeployError::Validation(_))));
        assert!(coordinator.manifests.lock().unwrap().is_empty());
        assert!(store.deployments.get("5").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_template_and_endpoint() {
        let store = seeded_store().await;
        let coordinator = Arc::new(RecordingCoordinator::default());
        let orchestrator = orchestrator(store, unused_runtimes(), coordinator);

        let mut unknown_template = request("app", &[("PORT", "9090"), ("TOK", "abc")]);
        unknown_template.template_id = 9;
        assert!(matches!(
            orchestrator.deploy(&unknown_template).await,
            Err(DeployError::Lookup(_))
        ));

        let mut unknown_endpoint = request("app", &[("PORT", "9090"), ("TOK", "abc")]);
        unknown_endpoint.endpoint_id = 9;
        assert!(matches!(
            orchestrator.deploy(&unknown_endpoint).await,
            Err(DeployError::Lookup(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_identity_stops_before_coordinator() {
        let store = seeded_store().await;
        let coordinator = Arc::new(RecordingCoordinator::default());

        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_pull_image()
            .returning(|_| Ok(HashMap::new()));
        runtime.expect_provision().times(0);

        let orchestrator = orchestrator(store.clone(), connector_for(runtime), coordinator.clone());
        let result = orchestrator
            .deploy(&request("app", &[("PORT", "9090"), ("TOK", "abc")]))
            .await;

        assert!(matches!(result, Err(DeployError::IdentityMissing(_))));
        assert!(coordinator.manifests.lock().unwrap().is_empty());
        assert!(store.deployments.get("5").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_manifest_leaves_record_untouched() {
        let store = seeded_store().await;
        let coordinator = Arc::new(RecordingCoordinator {
            reject_manifest: true,
            ..Default::default()
        });

        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_pull_image()
            .returning(|_| Ok(identity_labels()));
        runtime.expect_provision().times(0);

        let orchestrator = orchestrator(store.clone(), connector_for(runtime), coordinator.clone());
        let result = orchestrator
            .deploy(&request("app", &[("PORT", "9090"), ("TOK", "abc")]))
            .await;

        assert!(matches!(
            result,
            Err(DeployError::CoordinatorRejected { status: 400, .. })
        ));
        assert!(coordinator.secrets.lock().unwrap().is_empty());
        assert!(store.deployments.get("5").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_root_cert() {
        let store = seeded_store().await;
        let orchestrator = orchestrator(
            store.clone(),
            unused_runtimes(),
            Arc::new(RecordingCoordinator::default()),
        );

        assert!(matches!(
            orchestrator.set_root_cert(5, "nope".into()).await,
            Err(DeployError::Validation(_))
        ));

        let pem = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";
        let record = orchestrator.set_root_cert(5, pem.into()).await.unwrap();
        assert_eq!(record.root_cert.as_deref(), Some(pem));
        assert!(!record.is_initialized());

        let fetched = orchestrator.coordinator_deployment(5).await.unwrap();
        assert_eq!(fetched.root_cert.as_deref(), Some(pem));
        assert!(matches!(
            orchestrator.coordinator_deployment(6).await,
            Err(DeployError::Lookup(_))
        ));
    }

    #[tokio::test]
    async fn test_endpoint_locks_are_per_endpoint() {
        let locks = EndpointLocks::new();
        let _held = locks.acquire(1).await;

        // A different endpoint is not blocked.
        let other = tokio::time::timeout(std::time::Duration::from_millis(100), locks.acquire(2)).await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(std::time::Duration::from_millis(50), locks.acquire(1)).await;
        assert!(same.is_err());
    }
}
