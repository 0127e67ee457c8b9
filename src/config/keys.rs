use serde::Deserialize;

/// Where signing-key rows are fetched from on each refresh.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum KeySourceKind {
    /// A JSON array of key rows under a well-known key in the store.
    #[default]
    Store,
    /// A JSON file on disk, re-read on every refresh.
    File,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeyConfig {
    #[serde(default)]
    pub source: KeySourceKind,
    /// Path of the key file when `source = "file"`.
    #[serde(default)]
    pub file_path: String,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            source: KeySourceKind::default(),
            file_path: String::new(),
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

fn default_refresh_interval_secs() -> u64 {
    60
}
