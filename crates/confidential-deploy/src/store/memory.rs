//! In-memory repository.

use super::Repository;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Repository kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryRepository<T> {
    records: RwLock<BTreeMap<String, T>>,
}

impl<T> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl<T> Repository<T> for MemoryRepository<T>
where
    T: Clone + Send + Sync,
{
    async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn update(&self, id: &str, record: &T) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(id.to_string(), record.clone());
        Ok(())
    }
}
