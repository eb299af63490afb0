//! Record storage.
//!
//! Every collection is keyed by the record id rendered as a string. The
//! orchestrator only ever reads templates, endpoints and keys; coordinator
//! deployments are the one collection it writes.

mod file;
mod memory;
mod sealing;

pub use file::FileRepository;
pub use memory::MemoryRepository;
pub use sealing::Sealer;

use crate::error::StoreError;
use crate::types::{CoordinatorDeployment, Endpoint, KeyRecord, Template};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Keyed record collection.
#[async_trait]
pub trait Repository<T: Send + Sync>: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<T>, StoreError>;

    async fn list(&self) -> Result<Vec<T>, StoreError>;

    /// Insert or replace the record stored under `id`.
    async fn update(&self, id: &str, record: &T) -> Result<(), StoreError>;
}

/// The collections the orchestrator works with.
#[derive(Clone)]
pub struct DataStore {
    pub templates: Arc<dyn Repository<Template>>,
    pub endpoints: Arc<dyn Repository<Endpoint>>,
    pub deployments: Arc<dyn Repository<CoordinatorDeployment>>,
    pub keys: Arc<dyn Repository<KeyRecord>>,
}

impl DataStore {
    /// Non-persistent store; everything is lost on restart.
    pub fn memory() -> Self {
        warn!("Using in-memory storage (data will be lost on restart)");
        Self {
            templates: Arc::new(MemoryRepository::new()),
            endpoints: Arc::new(MemoryRepository::new()),
            deployments: Arc::new(MemoryRepository::new()),
            keys: Arc::new(MemoryRepository::new()),
        }
    }

    /// File-backed store under `dir`, one document per collection.
    ///
    /// With a sealer every document is AES-GCM encrypted at rest.
    pub async fn open(dir: &Path, sealer: Option<Sealer>) -> Result<Self, StoreError> {
        let extension = if sealer.is_some() { "sealed" } else { "json" };
        let path = |name: &str| dir.join(format!("{}.{}", name, extension));

        let store = Self {
            templates: Arc::new(FileRepository::open(path("templates"), sealer.clone()).await?),
            endpoints: Arc::new(FileRepository::open(path("endpoints"), sealer.clone()).await?),
            deployments: Arc::new(
                FileRepository::open(path("coordinator_deployments"), sealer.clone()).await?,
            ),
            keys: Arc::new(FileRepository::open(path("keys"), sealer.clone()).await?),
        };

        info!(
            dir = %dir.display(),
            sealed = sealer.is_some(),
            "Opened file storage"
        );
        Ok(store)
    }
}
