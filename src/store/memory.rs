use super::{StoreBackend, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

/// In-process store for single-node deployments and tests. Expired entries
/// are dropped lazily when they are next read.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(value)?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: serialized,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_ex<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(value)?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: serialized,
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let entry = match self.entries.get(key) {
            Some(entry) => entry.clone(),
            None => return Ok(None),
        };
        if entry.is_expired() {
            self.entries.remove(key);
            return Ok(None);
        }
        serde_json::from_str(&entry.value)
            .map_err(|e| StoreError::Deserialization(e.to_string()))
            .map(Some)
    }

    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        // DashMap::remove is atomic, so concurrent takers race for one Some.
        let entry = match self.entries.remove(key) {
            Some((_, entry)) => entry,
            None => return Ok(None),
        };
        if entry.is_expired() {
            return Ok(None);
        }
        serde_json::from_str(&entry.value)
            .map_err(|e| StoreError::Deserialization(e.to_string()))
            .map(Some)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}
