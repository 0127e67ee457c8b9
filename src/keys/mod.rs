//! Signing-key management.
//!
//! Key rows live in a backend (store key or file) and are folded into an
//! immutable snapshot: per-realm signer lists plus the public JWK set.
//! Readers always see a complete snapshot; the refresh task builds a full
//! replacement and swaps it in, and keeps the previous one when a refresh
//! fails.

use crate::models::SigningKeyRecord;
use crate::realms::ensure_leading_slash;
use crate::store::{Store, StoreBackend, StoreError, SIGNING_KEYS_KEY};
use jsonwebtoken::{Algorithm, EncodingKey};
use log::{error, info, warn};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

pub mod jwk;

pub use jwk::Jwk;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to read key file {path}: {source}")]
    File {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to parse key rows: {0}")]
    Parse(String),
    #[error("unsupported signing algorithm '{0}'")]
    UnsupportedAlgorithm(String),
    #[error("invalid key material for kid '{kid}': {reason}")]
    InvalidKey { kid: String, reason: String },
}

/// Where signing-key rows come from on each refresh.
#[derive(Clone)]
pub enum KeySource {
    /// JSON array of rows under [`SIGNING_KEYS_KEY`] in the store.
    Store(Store),
    /// JSON file re-read on every refresh.
    File(PathBuf),
    /// Fixed row set, for tests and bootstrap.
    Fixed(Vec<SigningKeyRecord>),
}

impl KeySource {
    pub fn from_settings(settings: &crate::config::Settings, store: &Store) -> Self {
        match settings.keys.source {
            crate::config::KeySourceKind::Store => Self::Store(store.clone()),
            crate::config::KeySourceKind::File => {
                Self::File(PathBuf::from(&settings.keys.file_path))
            }
        }
    }

    pub async fn fetch_all(&self) -> Result<Vec<SigningKeyRecord>, KeyError> {
        match self {
            Self::Store(store) => Ok(store
                .get::<Vec<SigningKeyRecord>>(SIGNING_KEYS_KEY)
                .await?
                .unwrap_or_default()),
            Self::File(path) => {
                let raw = tokio::fs::read_to_string(path).await.map_err(|source| {
                    KeyError::File {
                        path: path.display().to_string(),
                        source,
                    }
                })?;
                serde_json::from_str(&raw).map_err(|e| KeyError::Parse(e.to_string()))
            }
            Self::Fixed(records) => Ok(records.clone()),
        }
    }
}

/// A loaded private key ready to sign tokens for its realms.
#[derive(Clone)]
pub struct Signer {
    pub kid: String,
    pub algorithm: Algorithm,
    /// The algorithm as configured, for JWK export.
    pub algorithm_name: String,
    pub valid_from: i64,
    pub encoding_key: EncodingKey,
}

fn load_signer(record: &SigningKeyRecord) -> Result<(Signer, Jwk), KeyError> {
    let pem = record.private_key_pem.as_bytes();
    let invalid = |reason: String| KeyError::InvalidKey {
        kid: record.kid.clone(),
        reason,
    };

    let (algorithm, encoding_key, jwk) = match record.algorithm.as_str() {
        alg @ ("RS256" | "RS384" | "RS512" | "PS256" | "PS384" | "PS512") => {
            let algorithm = match alg {
                "RS256" => Algorithm::RS256,
                "RS384" => Algorithm::RS384,
                "RS512" => Algorithm::RS512,
                "PS256" => Algorithm::PS256,
                "PS384" => Algorithm::PS384,
                _ => Algorithm::PS512,
            };
            let encoding_key =
                EncodingKey::from_rsa_pem(pem).map_err(|e| invalid(e.to_string()))?;
            let private_key = rsa::RsaPrivateKey::from_pkcs8_pem(&record.private_key_pem)
                .or_else(|_| rsa::RsaPrivateKey::from_pkcs1_pem(&record.private_key_pem))
                .map_err(|e| invalid(e.to_string()))?;
            let jwk = Jwk::rsa(&record.kid, alg, &private_key.to_public_key());
            (algorithm, encoding_key, jwk)
        }
        "ES256" => {
            let encoding_key = EncodingKey::from_ec_pem(pem).map_err(|e| invalid(e.to_string()))?;
            let secret = p256::SecretKey::from_pkcs8_pem(&record.private_key_pem)
                .or_else(|_| p256::SecretKey::from_sec1_pem(&record.private_key_pem))
                .map_err(|e| invalid(e.to_string()))?;
            let point = secret.public_key().to_sec1_bytes();
            let jwk = Jwk::ec(&record.kid, "ES256", "P-256", &point)
                .ok_or_else(|| invalid("unexpected EC point encoding".to_string()))?;
            (Algorithm::ES256, encoding_key, jwk)
        }
        "ES384" => {
            let encoding_key = EncodingKey::from_ec_pem(pem).map_err(|e| invalid(e.to_string()))?;
            let secret = p384::SecretKey::from_pkcs8_pem(&record.private_key_pem)
                .or_else(|_| p384::SecretKey::from_sec1_pem(&record.private_key_pem))
                .map_err(|e| invalid(e.to_string()))?;
            let point = secret.public_key().to_sec1_bytes();
            let jwk = Jwk::ec(&record.kid, "ES384", "P-384", &point)
                .ok_or_else(|| invalid("unexpected EC point encoding".to_string()))?;
            (Algorithm::ES384, encoding_key, jwk)
        }
        other => return Err(KeyError::UnsupportedAlgorithm(other.to_string())),
    };

    Ok((
        Signer {
            kid: record.kid.clone(),
            algorithm,
            algorithm_name: record.algorithm.clone(),
            valid_from: record.valid_from,
            encoding_key,
        },
        jwk,
    ))
}

#[derive(Default)]
struct KeySnapshot {
    signers_by_realm: HashMap<String, Vec<Signer>>,
    jwks: Vec<Jwk>,
    kids: BTreeSet<String>,
}

impl KeySnapshot {
    fn build(records: &[SigningKeyRecord]) -> Self {
        let mut snapshot = Self::default();
        for record in records {
            match load_signer(record) {
                Ok((signer, jwk)) => {
                    for realm in &record.realms {
                        snapshot
                            .signers_by_realm
                            .entry(ensure_leading_slash(realm))
                            .or_default()
                            .push(signer.clone());
                    }
                    snapshot.jwks.push(jwk);
                    snapshot.kids.insert(signer.kid);
                }
                Err(err) => {
                    // A bad row must not block the rest of the key set.
                    error!("skipping signing key '{}': {}", record.kid, err);
                }
            }
        }
        snapshot
    }

    fn current_signer(&self, realm: &str, now: i64) -> Option<&Signer> {
        self.signers_by_realm
            .get(&ensure_leading_slash(realm))?
            .iter()
            .filter(|signer| signer.valid_from <= now)
            .max_by(|a, b| {
                // Newest key wins; equal validity starts resolve to the
                // lexicographically smallest kid so all nodes agree.
                a.valid_from
                    .cmp(&b.valid_from)
                    .then_with(|| b.kid.cmp(&a.kid))
            })
    }
}

pub struct KeyHolder {
    source: KeySource,
    snapshot: RwLock<Arc<KeySnapshot>>,
}

impl KeyHolder {
    pub fn new(source: KeySource) -> Self {
        Self {
            source,
            snapshot: RwLock::new(Arc::new(KeySnapshot::default())),
        }
    }

    /// Fetch all rows and swap in a freshly built snapshot. On fetch failure
    /// the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<(), KeyError> {
        let records = self.source.fetch_all().await?;
        let next = Arc::new(KeySnapshot::build(&records));

        let mut current = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if current.kids != next.kids {
            info!(
                "signing keys changed: {:?} -> {:?}",
                current.kids, next.kids
            );
        }
        *current = next;
        Ok(())
    }

    pub fn current_signer(&self, realm: &str) -> Option<Signer> {
        self.current_signer_at(realm, chrono::Utc::now().timestamp())
    }

    fn current_signer_at(&self, realm: &str, now: i64) -> Option<Signer> {
        self.read_snapshot().current_signer(realm, now).cloned()
    }

    pub fn public_jwks(&self) -> Vec<Jwk> {
        self.read_snapshot().jwks.clone()
    }

    fn read_snapshot(&self) -> Arc<KeySnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Background refresh loop. The holder is refreshed once before the server
/// starts; this keeps it current afterwards.
pub fn spawn_refresh_task(holder: Arc<KeyHolder>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(err) = holder.refresh().await {
                warn!("signing key refresh failed, keeping previous keys: {}", err);
            }
        }
    })
}
