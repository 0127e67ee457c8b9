//! Persisted record shapes. All of these are storage-engine-agnostic and
//! serialize through serde; the store backends only ever see JSON bytes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use utoipa::ToSchema;

/// A registered OAuth2 client, keyed by (client_id, realm) in the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ClientData {
    /// bcrypt hash of the client secret ($2a/$2b/$2y accepted).
    #[serde(default)]
    pub secret_hash: String,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    #[serde(default)]
    pub default_scopes: BTreeSet<String>,
    #[serde(default)]
    pub confidential: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub redirect_uris: BTreeSet<String>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub last_modified_by: String,
}

/// One of possibly several concurrently valid password hashes of a user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PasswordHash {
    pub hash: String,
    /// Creation time, epoch seconds.
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub created_by: String,
}

/// A user record, keyed by (username, realm). A presented password is valid
/// if it matches any of the stored hashes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UserData {
    #[serde(default)]
    pub password_hashes: Vec<PasswordHash>,
    /// Scope name -> value. The key set is the user's authorized scopes;
    /// values are kept for parity with legacy records.
    #[serde(default)]
    pub scopes: HashMap<String, String>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub last_modified_by: String,
}

/// Ephemeral authorization-code context, keyed by the opaque code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCodeRecord {
    pub code: String,
    pub state: String,
    pub client_id: String,
    pub realm: String,
    pub scopes: BTreeSet<String>,
    pub claims: HashMap<String, String>,
    pub redirect_uri: String,
    /// Absolute expiry, epoch seconds.
    pub expires: i64,
}

/// Recorded user consent, keyed by (username, realm, client_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub scopes: BTreeSet<String>,
}

/// A signing key row as stored in the key backend. The private PEM never
/// leaves the key holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningKeyRecord {
    pub kid: String,
    /// Realm names this key may sign for.
    pub realms: BTreeSet<String>,
    pub private_key_pem: String,
    /// JWS algorithm identifier, e.g. "RS256" or "ES384".
    pub algorithm: String,
    /// Key becomes eligible at this instant, epoch seconds.
    pub valid_from: i64,
}

impl ClientData {
    pub fn with_secret_hash(mut self, hash: impl Into<String>) -> Self {
        self.secret_hash = hash.into();
        self
    }

    pub fn with_scopes(mut self, scopes: BTreeSet<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_default_scopes(mut self, scopes: BTreeSet<String>) -> Self {
        self.default_scopes = scopes;
        self
    }

    pub fn confidential(mut self, confidential: bool) -> Self {
        self.confidential = confidential;
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uris.insert(uri.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
