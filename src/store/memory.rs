//! In-process document store for local development.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{DocumentStore, StoreError};

/// In-memory bins keyed by id.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    bins: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a bin with a record, replacing any existing one.
    #[cfg(test)]
    pub async fn insert(&self, bin_id: impl Into<String>, record: Value) {
        self.bins.lock().await.insert(bin_id.into(), record);
    }

    /// Snapshot of a bin's record, if present.
    #[cfg(test)]
    pub async fn record(&self, bin_id: &str) -> Option<Value> {
        self.bins.lock().await.get(bin_id).cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch(&self, bin_id: &str) -> Result<Value, StoreError> {
        self.bins
            .lock()
            .await
            .get(bin_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(bin_id.to_string()))
    }

    async fn put(&self, bin_id: &str, record: &Value) -> Result<(), StoreError> {
        let mut bins = self.bins.lock().await;
        match bins.get_mut(bin_id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(bin_id.to_string())),
        }
    }

    async fn create(&self, record: &Value) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.bins.lock().await.insert(id.clone(), record.clone());
        Ok(id)
    }
}
