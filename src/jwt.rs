//! Access-token construction and signing.

use crate::errors::OAuthError;
use crate::keys::KeyHolder;
use crate::realms::SUB;
use jsonwebtoken::Header;
use log::info;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Issuer claim carried by every token. Kept to a single byte so the token
/// stays small enough for HTTP headers.
pub const ISSUER: &str = "B";

#[derive(Debug, Error)]
pub enum TokenError {
    /// A realm authenticated a user but returned no `sub` claim. That is a
    /// backend contract violation, not a failure of the user's credentials.
    #[error("'sub' claim missing from authentication response")]
    MissingSubject,
    #[error("no signing key configured for realm {0}")]
    NoSigner(String),
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

impl From<TokenError> for OAuthError {
    fn from(err: TokenError) -> Self {
        OAuthError::Internal(err.to_string())
    }
}

#[derive(Debug)]
pub struct IssuedToken {
    pub jwt: String,
    pub expires_in: u64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    key_holder: Arc<KeyHolder>,
}

impl TokenIssuer {
    pub fn new(key_holder: Arc<KeyHolder>) -> Self {
        Self { key_holder }
    }

    /// Build and sign an access token for `realm`.
    ///
    /// `extra_claims` comes from the user realm and must contain `sub`; its
    /// entries are merged over the base claim set. `masked_subject` is only
    /// used for logging.
    pub fn issue(
        &self,
        realm: &str,
        scopes: &BTreeSet<String>,
        extra_claims: &HashMap<String, String>,
        lifetime_secs: u64,
        masked_subject: &str,
    ) -> Result<IssuedToken, TokenError> {
        if !extra_claims.contains_key(SUB) {
            return Err(TokenError::MissingSubject);
        }

        let signer = self
            .key_holder
            .current_signer(realm)
            .ok_or_else(|| TokenError::NoSigner(realm.to_string()))?;

        let iat = chrono::Utc::now().timestamp();
        let exp = iat + lifetime_secs as i64;

        let mut claims = Map::new();
        claims.insert("iss".to_string(), json!(ISSUER));
        claims.insert("iat".to_string(), json!(iat));
        claims.insert("exp".to_string(), json!(exp));
        claims.insert("realm".to_string(), json!(realm));
        claims.insert("scope".to_string(), json!(scopes));
        for (name, value) in extra_claims {
            claims.insert(name.clone(), json!(value));
        }

        let mut header = Header::new(signer.algorithm);
        header.kid = Some(signer.kid.clone());

        let jwt = jsonwebtoken::encode(&header, &claims, &signer.encoding_key)?;
        info!(
            "issued access token for {} in realm {} (kid {}, {} bytes)",
            masked_subject,
            realm,
            signer.kid,
            jwt.len()
        );

        Ok(IssuedToken {
            jwt,
            expires_in: lifetime_secs,
        })
    }
}
