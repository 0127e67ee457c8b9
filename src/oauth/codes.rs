//! Single-use authorization codes.
//!
//! A code is an opaque handle to the authentication that already happened on
//! the authorize endpoint. The record is stored with a TTL and removed
//! atomically on redemption, so a code can never be redeemed twice.

use crate::errors::{CodeFailure, OAuthError};
use crate::models::AuthorizationCodeRecord;
use crate::store::{code_key, Store, StoreBackend};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use std::collections::{BTreeSet, HashMap};

/// Codes expire after ten minutes, per RFC 6749's recommended maximum.
pub const CODE_TTL_SECS: u64 = 600;

fn generate_code() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Clone)]
pub struct AuthorizationCodeStore {
    store: Store,
}

impl AuthorizationCodeStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        state: &str,
        client_id: &str,
        realm: &str,
        scopes: BTreeSet<String>,
        claims: HashMap<String, String>,
        redirect_uri: &str,
    ) -> Result<String, OAuthError> {
        let code = generate_code();
        let record = AuthorizationCodeRecord {
            code: code.clone(),
            state: state.to_string(),
            client_id: client_id.to_string(),
            realm: realm.to_string(),
            scopes,
            claims,
            redirect_uri: redirect_uri.to_string(),
            expires: chrono::Utc::now().timestamp() + CODE_TTL_SECS as i64,
        };
        self.store
            .set_ex(&code_key(&code), &record, CODE_TTL_SECS)
            .await
            .map_err(|e| OAuthError::Internal(e.to_string()))?;
        Ok(code)
    }

    /// Redeem a code. The record is consumed even when validation fails
    /// afterwards; a suspicious redemption attempt burns the code.
    pub async fn redeem(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<AuthorizationCodeRecord, OAuthError> {
        let record: AuthorizationCodeRecord = self
            .store
            .take(&code_key(code))
            .await
            .map_err(|e| OAuthError::Internal(e.to_string()))?
            .ok_or(OAuthError::AuthorizationCodeInvalid(
                CodeFailure::NotFoundOrExpired,
            ))?;

        if record.expires < chrono::Utc::now().timestamp() {
            return Err(OAuthError::AuthorizationCodeInvalid(
                CodeFailure::NotFoundOrExpired,
            ));
        }
        if record.client_id != client_id {
            return Err(OAuthError::AuthorizationCodeInvalid(
                CodeFailure::ClientMismatch,
            ));
        }
        if record.redirect_uri != redirect_uri {
            return Err(OAuthError::AuthorizationCodeInvalid(
                CodeFailure::RedirectUriMismatch,
            ));
        }
        Ok(record)
    }
}
