//! File-backed repository.

use super::{Repository, Sealer};
use crate::error::StoreError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Repository persisted as a single JSON document, optionally sealed.
///
/// Records are cached in memory; every update rewrites the document
/// atomically before the cache changes.
pub struct FileRepository<T> {
    path: PathBuf,
    sealer: Option<Sealer>,
    records: RwLock<BTreeMap<String, T>>,
}

impl<T> FileRepository<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Load the document at `path`, starting empty if it does not exist.
    pub async fn open(path: PathBuf, sealer: Option<Sealer>) -> Result<Self, StoreError> {
        let records = if fs::try_exists(&path).await? {
            let data = fs::read(&path).await?;
            let plaintext = match &sealer {
                Some(sealer) => sealer.open(&data)?,
                None => data,
            };
            let records: BTreeMap<String, T> = serde_json::from_slice(&plaintext)?;
            info!(path = %path.display(), count = records.len(), "Loaded records");
            records
        } else {
            debug!(path = %path.display(), "No document yet, starting empty");
            BTreeMap::new()
        };

        Ok(Self {
            path,
            sealer,
            records: RwLock::new(records),
        })
    }

    async fn persist(&self, records: &BTreeMap<String, T>) -> Result<(), StoreError> {
        let plaintext = serde_json::to_vec_pretty(records)?;
        let data = match &self.sealer {
            Some(sealer) => sealer.seal(&plaintext)?,
            None => plaintext,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write atomically using temp file + rename
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, &data).await?;
        fs::rename(&temp_path, &self.path).await?;

        debug!(path = %self.path.display(), bytes = data.len(), "Saved records");
        Ok(())
    }
}

#[async_trait]
impl<T> Repository<T> for FileRepository<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn update(&self, id: &str, record: &T) -> Result<(), StoreError> {
        let mut records = self.records.write().await;

        let mut next = records.clone();
        next.insert(id.to_string(), record.clone());
        self.persist(&next).await?;

        *records = next;
        Ok(())
    }
}
