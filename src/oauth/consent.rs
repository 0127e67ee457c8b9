//! Recorded user consent, keyed by (user, realm, client).

use crate::errors::OAuthError;
use crate::models::ConsentRecord;
use crate::store::{consent_key, Store, StoreBackend};
use std::collections::BTreeSet;

#[derive(Clone)]
pub struct ConsentStore {
    store: Store,
}

impl ConsentStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Record consent, replacing whatever was stored before.
    pub async fn store(
        &self,
        username: &str,
        realm: &str,
        client_id: &str,
        scopes: BTreeSet<String>,
    ) -> Result<(), OAuthError> {
        self.store
            .set(
                &consent_key(realm, username, client_id),
                &ConsentRecord { scopes },
            )
            .await
            .map_err(|e| OAuthError::Internal(e.to_string()))
    }

    /// The scopes the user has consented to for this client; empty when no
    /// consent was ever recorded.
    pub async fn consented_scopes(
        &self,
        username: &str,
        realm: &str,
        client_id: &str,
    ) -> Result<BTreeSet<String>, OAuthError> {
        let record: Option<ConsentRecord> = self
            .store
            .get(&consent_key(realm, username, client_id))
            .await
            .map_err(|e| OAuthError::Internal(e.to_string()))?;
        Ok(record.map(|r| r.scopes).unwrap_or_default())
    }

    pub async fn withdraw(
        &self,
        username: &str,
        realm: &str,
        client_id: &str,
    ) -> Result<(), OAuthError> {
        self.store
            .delete(&consent_key(realm, username, client_id))
            .await
            .map_err(|e| OAuthError::Internal(e.to_string()))
    }
}
