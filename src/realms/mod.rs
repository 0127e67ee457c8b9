//! Identity realms.
//!
//! A realm pairs a client-credential backend with a user-credential backend.
//! Which concrete backend serves which side is wired once at startup from
//! configuration; afterwards the registry is immutable and handlers only
//! resolve realms by name.

use crate::config::{ClientBackendKind, Settings, UserBackendKind};
use crate::errors::OAuthError;
use crate::models::{ClientData, UserData};
use crate::store::{Store, StoreError};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

pub mod customer;
pub mod store_backed;
pub mod upstream;

pub use customer::CustomerUserRealm;
pub use store_backed::{StoreBackedClientRealm, StoreBackedUserRealm};
pub use upstream::UpstreamUserRealm;

/// Claim every user backend must supply.
pub const SUB: &str = "sub";

#[derive(Debug, Error)]
pub enum RealmError {
    #[error("client authentication failed for {client_id} in realm {realm}: {reason}")]
    ClientAuthenticationFailed {
        client_id: String,
        realm: String,
        reason: &'static str,
    },
    #[error("client {client_id} in realm {realm} requested invalid scopes: {missing:?}")]
    ClientScopeInvalid {
        client_id: String,
        realm: String,
        missing: BTreeSet<String>,
    },
    /// The username is already masked by the realm that raised this.
    #[error("user authentication failed for '{username}' in realm {realm}")]
    UserAuthenticationFailed { username: String, realm: String },
    #[error("user '{username}' in realm {realm} requested invalid scopes: {missing:?}")]
    UserScopeInvalid {
        username: String,
        realm: String,
        missing: BTreeSet<String>,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("remote realm call failed: {0}")]
    Remote(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RealmError> for OAuthError {
    fn from(err: RealmError) -> Self {
        match err {
            RealmError::ClientAuthenticationFailed {
                client_id,
                realm,
                reason,
            } => OAuthError::ClientAuthenticationFailed {
                client_id,
                realm,
                reason,
            },
            RealmError::ClientScopeInvalid {
                client_id,
                realm,
                missing,
            } => OAuthError::ClientScopeInvalid {
                client_id,
                realm,
                missing,
            },
            RealmError::UserAuthenticationFailed { username, realm } => {
                OAuthError::UserAuthenticationFailed { username, realm }
            }
            RealmError::UserScopeInvalid {
                username,
                realm,
                missing,
            } => OAuthError::UserScopeInvalid {
                username,
                realm,
                missing,
            },
            RealmError::NotFound(msg) => OAuthError::NotFound(msg),
            RealmError::Remote(msg) => OAuthError::Upstream(msg),
            RealmError::Store(err) => OAuthError::Internal(err.to_string()),
        }
    }
}

/// Client-credential side of a realm.
#[async_trait::async_trait]
pub trait ClientRealm: Send + Sync {
    fn name(&self) -> &str;

    /// Verify client credentials and that every requested scope is covered
    /// by the client's owned or default scopes.
    async fn authenticate(
        &self,
        client_id: &str,
        client_secret: &str,
        scopes: &BTreeSet<String>,
        default_scopes: &BTreeSet<String>,
    ) -> Result<(), RealmError>;

    async fn get(&self, client_id: &str) -> Result<Option<ClientData>, RealmError>;
}

/// User-credential side of a realm.
#[async_trait::async_trait]
pub trait UserRealm: Send + Sync {
    fn name(&self) -> &str;

    /// Verify user credentials and return the extra token claims. The map
    /// must contain `sub`.
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        scopes: &BTreeSet<String>,
        default_scopes: &BTreeSet<String>,
    ) -> Result<HashMap<String, String>, RealmError>;

    /// Render a subject fit for logs. Backends holding PII override this
    /// with an irreversible mask; the default is the identity.
    fn mask_subject(&self, sub: &str) -> String {
        sub.to_string()
    }
}

#[derive(Clone)]
pub enum ClientRealmKind {
    Store(StoreBackedClientRealm),
}

#[async_trait::async_trait]
impl ClientRealm for ClientRealmKind {
    fn name(&self) -> &str {
        match self {
            Self::Store(realm) => realm.name(),
        }
    }

    async fn authenticate(
        &self,
        client_id: &str,
        client_secret: &str,
        scopes: &BTreeSet<String>,
        default_scopes: &BTreeSet<String>,
    ) -> Result<(), RealmError> {
        match self {
            Self::Store(realm) => {
                realm
                    .authenticate(client_id, client_secret, scopes, default_scopes)
                    .await
            }
        }
    }

    async fn get(&self, client_id: &str) -> Result<Option<ClientData>, RealmError> {
        match self {
            Self::Store(realm) => realm.get(client_id).await,
        }
    }
}

#[derive(Clone)]
pub enum UserRealmKind {
    Store(StoreBackedUserRealm),
    Upstream(UpstreamUserRealm),
    Customer(CustomerUserRealm),
}

#[async_trait::async_trait]
impl UserRealm for UserRealmKind {
    fn name(&self) -> &str {
        match self {
            Self::Store(realm) => realm.name(),
            Self::Upstream(realm) => realm.name(),
            Self::Customer(realm) => realm.name(),
        }
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        scopes: &BTreeSet<String>,
        default_scopes: &BTreeSet<String>,
    ) -> Result<HashMap<String, String>, RealmError> {
        match self {
            Self::Store(realm) => {
                realm
                    .authenticate(username, password, scopes, default_scopes)
                    .await
            }
            Self::Upstream(realm) => {
                realm
                    .authenticate(username, password, scopes, default_scopes)
                    .await
            }
            Self::Customer(realm) => {
                realm
                    .authenticate(username, password, scopes, default_scopes)
                    .await
            }
        }
    }

    fn mask_subject(&self, sub: &str) -> String {
        match self {
            Self::Store(realm) => UserRealm::mask_subject(realm, sub),
            Self::Upstream(realm) => UserRealm::mask_subject(realm, sub),
            Self::Customer(realm) => UserRealm::mask_subject(realm, sub),
        }
    }
}

/// All realms known to this server, resolved by their slash-prefixed name.
#[derive(Clone)]
pub struct RealmRegistry {
    client_realms: HashMap<String, ClientRealmKind>,
    user_realms: HashMap<String, UserRealmKind>,
}

impl RealmRegistry {
    pub fn from_settings(settings: &Settings, store: &Store) -> Result<Self, OAuthError> {
        let mut client_realms = HashMap::new();
        let mut user_realms = HashMap::new();

        for (name, realm_settings) in &settings.realms {
            let realm_name = ensure_leading_slash(name);

            let client_realm = match realm_settings.client {
                ClientBackendKind::Store => ClientRealmKind::Store(StoreBackedClientRealm::new(
                    realm_name.clone(),
                    store.clone(),
                )),
            };

            let user_realm = match realm_settings.user {
                UserBackendKind::Store => UserRealmKind::Store(StoreBackedUserRealm::new(
                    realm_name.clone(),
                    store.clone(),
                )),
                UserBackendKind::Upstream => UserRealmKind::Upstream(
                    UpstreamUserRealm::new(realm_name.clone(), &settings.upstream)
                        .map_err(|e| OAuthError::Internal(e.to_string()))?,
                ),
                UserBackendKind::Customer => UserRealmKind::Customer(
                    CustomerUserRealm::new(realm_name.clone(), &settings.customer)
                        .map_err(|e| OAuthError::Internal(e.to_string()))?,
                ),
            };

            client_realms.insert(realm_name.clone(), client_realm);
            user_realms.insert(realm_name, user_realm);
        }

        Ok(Self {
            client_realms,
            user_realms,
        })
    }

    pub fn client_realm(&self, realm: &str) -> Result<&ClientRealmKind, OAuthError> {
        self.client_realms
            .get(&ensure_leading_slash(realm))
            .ok_or_else(|| OAuthError::RealmNotFound(realm.to_string()))
    }

    pub fn user_realm(&self, realm: &str) -> Result<&UserRealmKind, OAuthError> {
        self.user_realms
            .get(&ensure_leading_slash(realm))
            .ok_or_else(|| OAuthError::RealmNotFound(realm.to_string()))
    }

    /// Store-backed client realm, for the administrative endpoints.
    pub fn managed_client_realm(
        &self,
        realm: &str,
    ) -> Result<&StoreBackedClientRealm, OAuthError> {
        match self.client_realm(realm)? {
            ClientRealmKind::Store(managed) => Ok(managed),
        }
    }

    /// Store-backed user realm, for the administrative endpoints.
    pub fn managed_user_realm(&self, realm: &str) -> Result<&StoreBackedUserRealm, OAuthError> {
        match self.user_realm(realm)? {
            UserRealmKind::Store(managed) => Ok(managed),
            _ => Err(OAuthError::RealmNotManaged(realm.to_string())),
        }
    }

    /// Infer a realm from a request Host header: the host is split on dots
    /// and dashes and the first token matching a configured realm name wins.
    pub fn find_realm_in_host(&self, host: &str) -> Option<&str> {
        for token in host.split(['.', '-']) {
            for name in self.user_realms.keys() {
                if strip_leading_slash(name).eq_ignore_ascii_case(token) {
                    return Some(name.as_str());
                }
            }
        }
        None
    }
}

pub fn strip_leading_slash(realm: &str) -> &str {
    realm.strip_prefix('/').unwrap_or(realm)
}

pub fn ensure_leading_slash(realm: &str) -> String {
    if realm.starts_with('/') {
        realm.to_string()
    } else {
        format!("/{realm}")
    }
}

/// bcrypt comparison accepting the `$2a`, `$2b` and `$2y` salt revisions.
/// Malformed hashes simply never match.
pub fn check_bcrypt_password(password: &str, password_hash: &str) -> bool {
    bcrypt::verify(password, password_hash).unwrap_or(false)
}

/// Mask an e-mail address for logging: keep at most the first two characters
/// of the local part and the top-level domain, and append a SHA-256 digest so
/// operators can correlate log lines without seeing the address. Inputs that
/// do not look like e-mail addresses pass through unchanged.
pub fn mask_email(username: &str) -> String {
    let Some((local, domain)) = username.split_once('@') else {
        return username.to_string();
    };
    let Some(tld_dot) = domain.rfind('.') else {
        return username.to_string();
    };
    if local.is_empty() || tld_dot == 0 || tld_dot == domain.len() - 1 {
        return username.to_string();
    }

    let prefix: String = local.chars().take(2).collect();
    let tld = &domain[tld_dot..];
    let digest = Sha256::digest(username.as_bytes());
    format!("{prefix}***@***{tld} ({digest:x})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_helpers() {
        assert_eq!(strip_leading_slash("/services"), "services");
        assert_eq!(strip_leading_slash("services"), "services");
        assert_eq!(ensure_leading_slash("services"), "/services");
        assert_eq!(ensure_leading_slash("/services"), "/services");
    }

    #[test]
    fn bcrypt_accepts_all_salt_revisions() {
        let hash = bcrypt::hash("secret", 4).unwrap();
        assert!(hash.starts_with("$2b"));
        assert!(check_bcrypt_password("secret", &hash));
        assert!(!check_bcrypt_password("wrong", &hash));

        let legacy_a = format!("$2a{}", &hash[3..]);
        assert!(check_bcrypt_password("secret", &legacy_a));
        let legacy_y = format!("$2y{}", &hash[3..]);
        assert!(check_bcrypt_password("secret", &legacy_y));
    }

    #[test]
    fn bcrypt_rejects_garbage_hash() {
        assert!(!check_bcrypt_password("secret", "not-a-bcrypt-hash"));
        assert!(!check_bcrypt_password("secret", ""));
    }

    #[test]
    fn email_masking_hides_the_address() {
        let masked = mask_email("jane.doe@example.com");
        assert!(masked.starts_with("ja***@***.com ("));
        assert!(!masked.contains("jane.doe"));
        assert!(!masked.contains("example"));

        // stable digest for correlation
        assert_eq!(masked, mask_email("jane.doe@example.com"));
        assert_ne!(masked, mask_email("john.doe@example.com"));
    }

    #[test]
    fn non_email_subjects_pass_through() {
        assert_eq!(mask_email("service-user-42"), "service-user-42");
        assert_eq!(mask_email("oddball@nodomain"), "oddball@nodomain");
    }

    #[tokio::test]
    async fn registry_resolves_realms_with_and_without_slash() {
        let settings = Settings::default();
        let store = Store::Memory(crate::store::memory::MemoryStore::new());
        let registry = RealmRegistry::from_settings(&settings, &store).unwrap();

        assert!(registry.client_realm("/services").is_ok());
        assert!(registry.client_realm("services").is_ok());
        assert!(matches!(
            registry.user_realm("/nope"),
            Err(OAuthError::RealmNotFound(_))
        ));
    }

    #[tokio::test]
    async fn host_realm_inference_splits_on_dots_and_dashes() {
        let settings = Settings::default();
        let store = Store::Memory(crate::store::memory::MemoryStore::new());
        let registry = RealmRegistry::from_settings(&settings, &store).unwrap();

        assert_eq!(
            registry.find_realm_in_host("token.services.example.org"),
            Some("/services")
        );
        assert_eq!(
            registry.find_realm_in_host("services-auth.example.org"),
            Some("/services")
        );
        assert_eq!(registry.find_realm_in_host("auth.example.org"), None);
    }
}
