use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub mod memory;
pub mod redis;

/// Store key under which the JSON array of signing-key rows lives.
pub const SIGNING_KEYS_KEY: &str = "keys/signing";

pub fn client_key(realm: &str, client_id: &str) -> String {
    format!("clients{realm}/{client_id}")
}

pub fn user_key(realm: &str, username: &str) -> String {
    format!("users{realm}/{username}")
}

pub fn code_key(code: &str) -> String {
    format!("codes/{code}")
}

pub fn consent_key(realm: &str, username: &str, client_id: &str) -> String {
    format!("consent{realm}/{username}/{client_id}")
}

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to serialize value: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to parse value: {0}")]
    Deserialization(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Contract every storage backend fulfills. Records are stored as JSON
/// strings; values without a TTL live until removed. Implementations must be
/// thread-safe and cloneable so handlers can share them.
#[async_trait::async_trait]
pub trait StoreBackend: Send + Sync {
    /// Store a value without expiry
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T)
        -> Result<(), StoreError>;

    /// Store a value that expires after `ttl_secs`
    async fn set_ex<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), StoreError>;

    /// Retrieve a value
    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError>;

    /// Remove a value and return what was stored, in one step. This is the
    /// primitive behind single-use authorization codes: only one caller can
    /// ever observe `Some`.
    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError>;

    /// Delete a value
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Performs a deep health check on the backend. For Redis this pings the
    /// server, for the memory backend it always succeeds.
    async fn health_check(&self) -> Result<(), String>;
}

/// Store implementation that provides a uniform interface regardless of
/// backend. The concrete implementation is chosen at startup based on the
/// application configuration.
#[derive(Clone)]
pub enum Store {
    /// In-process store backed by a concurrent map
    Memory(memory::MemoryStore),
    /// Redis-based store
    Redis(redis::RedisStore),
}

#[async_trait::async_trait]
impl StoreBackend for Store {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.set(key, value).await,
            Self::Redis(store) => store.set(key, value).await,
        }
    }

    async fn set_ex<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.set_ex(key, value, ttl_secs).await,
            Self::Redis(store) => store.set_ex(key, value, ttl_secs).await,
        }
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self {
            Self::Memory(store) => store.get(key).await,
            Self::Redis(store) => store.get(key).await,
        }
    }

    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self {
            Self::Memory(store) => store.take(key).await,
            Self::Redis(store) => store.take(key).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.delete(key).await,
            Self::Redis(store) => store.delete(key).await,
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::Memory(store) => store.health_check().await,
            Self::Redis(store) => store.health_check().await,
        }
    }
}

/// Factory that creates the configured store backend.
pub async fn create_store(settings: &crate::config::Settings) -> Result<Store, StoreError> {
    match settings.store.backend {
        crate::config::StoreBackendKind::Memory => Ok(Store::Memory(memory::MemoryStore::new())),
        crate::config::StoreBackendKind::Redis => {
            if settings.store.redis.url.is_empty() {
                return Err(StoreError::Config(
                    "Redis URL is required for the Redis store".to_string(),
                ));
            }
            let store = redis::RedisStore::new(&settings.store.redis.url)
                .await
                .map_err(StoreError::Config)?;
            Ok(Store::Redis(store))
        }
    }
}
