pub use crate::config::keys::{KeyConfig, KeySourceKind};
pub use crate::config::realms::{ClientBackendKind, RealmSettings, UserBackendKind};
pub use crate::config::remote::{CustomerConfig, UpstreamConfig};
pub use crate::config::store::{RedisStoreConfig, StoreBackendKind, StoreConfig};
use config::{Config as ConfigCrate, ConfigError};
use serde::Deserialize;
use std::collections::HashMap;

pub mod keys;
pub mod realms;
pub mod remote;
pub mod store;

/// Main configuration of the authorization server, loaded from `OAUTH_*`
/// environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// The port the server will listen on (default: 7000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Token lifetimes
    #[serde(default)]
    pub token: TokenConfig,

    /// Default scopes per realm
    #[serde(default)]
    pub scope: ScopeConfig,

    /// Persistent store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Signing-key source and refresh configuration
    #[serde(default)]
    pub keys: KeyConfig,

    /// Realm name (without leading slash) -> backend selection
    #[serde(default = "default_realms")]
    pub realms: HashMap<String, RealmSettings>,

    /// Upstream-delegate realm configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Legacy customer-directory realm configuration
    #[serde(default)]
    pub customer: CustomerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenConfig {
    /// Global default access-token lifetime in seconds (default: 8 hours).
    #[serde(default = "default_token_lifetime_secs")]
    pub lifetime_secs: u64,
    /// Per-realm overrides, keyed like `scope.defaults` (realm name without
    /// slash, case-insensitive).
    #[serde(default)]
    pub lifetimes: HashMap<String, u64>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: default_token_lifetime_secs(),
            lifetimes: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScopeConfig {
    /// Realm name -> space-separated default scope string, e.g.
    /// `OAUTH_SCOPE_DEFAULTS_SERVICES="uid"`.
    #[serde(default)]
    pub defaults: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: default_port(),
            token: TokenConfig::default(),
            scope: ScopeConfig::default(),
            store: StoreConfig::default(),
            keys: KeyConfig::default(),
            realms: default_realms(),
            upstream: UpstreamConfig::default(),
            customer: CustomerConfig::default(),
        }
    }
}

fn default_port() -> u16 {
    7000
}

fn default_token_lifetime_secs() -> u64 {
    8 * 60 * 60
}

fn default_realms() -> HashMap<String, RealmSettings> {
    let mut realms = HashMap::new();
    realms.insert("services".to_string(), RealmSettings::default());
    realms
}

impl Settings {
    /// Creates a new Settings instance from environment variables
    pub fn new() -> Result<Self, String> {
        ConfigCrate::builder()
            .add_source(
                config::Environment::with_prefix("OAUTH")
                    .prefix_separator("_")
                    .separator("_")
                    .convert_case(config::Case::Snake),
            )
            .build()
            .map_err(|e: ConfigError| e.to_string())?
            .try_deserialize()
            .map_err(|e| e.to_string())
    }

    /// Access-token lifetime for a realm, falling back to the global default.
    pub fn token_lifetime_secs(&self, realm: &str) -> u64 {
        let wanted = crate::realms::strip_leading_slash(realm).to_lowercase();
        self.token
            .lifetimes
            .iter()
            .find(|(key, _)| crate::realms::strip_leading_slash(key).to_lowercase() == wanted)
            .map(|(_, secs)| *secs)
            .unwrap_or(self.token.lifetime_secs)
    }

    #[cfg(test)]
    pub fn for_test_with_mocks(
        upstream_mock: &wiremock::MockServer,
        customer_mock: &wiremock::MockServer,
    ) -> Self {
        let mut realms = HashMap::new();
        realms.insert(
            "services".to_string(),
            RealmSettings {
                client: ClientBackendKind::Store,
                user: UserBackendKind::Store,
            },
        );
        realms.insert(
            "employees".to_string(),
            RealmSettings {
                client: ClientBackendKind::Store,
                user: UserBackendKind::Upstream,
            },
        );
        realms.insert(
            "customers".to_string(),
            RealmSettings {
                client: ClientBackendKind::Store,
                user: UserBackendKind::Customer,
            },
        );

        Self {
            port: 0, // let the OS choose a port
            token: TokenConfig::default(),
            scope: ScopeConfig {
                defaults: HashMap::from([("services".to_string(), "uid".to_string())]),
            },
            store: StoreConfig {
                backend: StoreBackendKind::Memory,
                redis: RedisStoreConfig::default(),
            },
            keys: KeyConfig {
                source: KeySourceKind::Store,
                file_path: String::new(),
                refresh_interval_secs: 1,
            },
            realms,
            upstream: UpstreamConfig {
                token_url: format!("{}/oauth2/access_token", upstream_mock.uri()),
                token_info_url: format!("{}/tokeninfo", upstream_mock.uri()),
                timeout_secs: 2,
            },
            customer: CustomerConfig {
                service_url: format!("{}/login", customer_mock.uri()),
                app_domain_id: 1,
                timeout_secs: 2,
            },
        }
    }
}
