use serde::Deserialize;

/// Which storage backend the persistent stores use.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackendKind {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackendKind,
    #[serde(default)]
    pub redis: RedisStoreConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisStoreConfig {
    /// Connection URL, e.g. redis://localhost:6379. Required for the Redis
    /// backend.
    #[serde(default)]
    pub url: String,
}
