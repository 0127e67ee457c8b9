use serde::Deserialize;

/// Backend implementation for the client side of a realm.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ClientBackendKind {
    /// Managed client records in the persistent store.
    #[default]
    Store,
}

/// Backend implementation for the user side of a realm.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UserBackendKind {
    /// Managed user records in the persistent store.
    #[default]
    Store,
    /// Delegate the credential check to another OAuth2 token endpoint.
    Upstream,
    /// Remote legacy customer directory.
    Customer,
}

/// Per-realm backend selection. Realm names are configured without the
/// leading slash (`services`), which is added when the registry is built.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RealmSettings {
    #[serde(default)]
    pub client: ClientBackendKind,
    #[serde(default)]
    pub user: UserBackendKind,
}
