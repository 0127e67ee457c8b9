use crate::config::Settings;
use crate::jwt::TokenIssuer;
use crate::keys::{KeyHolder, KeySource};
use crate::oauth::{AuthorizationCodeStore, ConsentStore};
use crate::realms::RealmRegistry;
use crate::store::{create_store, Store};
use log::warn;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Store,
    pub realms: Arc<RealmRegistry>,
    pub key_holder: Arc<KeyHolder>,
    pub token_issuer: TokenIssuer,
    pub codes: AuthorizationCodeStore,
    pub consents: ConsentStore,
}

impl AppState {
    pub async fn new(settings: Settings) -> Result<Self, std::io::Error> {
        let store = create_store(&settings)
            .await
            .map_err(|e| std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to create store: {}", e),
            ))?;
        Self::with_existing_store(settings, store).await
    }

    pub async fn with_existing_store(
        settings: Settings,
        store: Store,
    ) -> Result<Self, std::io::Error> {
        let realms = RealmRegistry::from_settings(&settings, &store)
            .map_err(|e| std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to build realms: {}", e),
            ))?;

        let key_holder = Arc::new(KeyHolder::new(KeySource::from_settings(&settings, &store)));
        // Serve with whatever keys are available; the refresh task will keep
        // trying in the background.
        if let Err(e) = key_holder.refresh().await {
            warn!("initial signing key load failed: {}", e);
        }

        Ok(Self {
            settings: Arc::new(settings),
            store: store.clone(),
            realms: Arc::new(realms),
            key_holder: key_holder.clone(),
            token_issuer: TokenIssuer::new(key_holder),
            codes: AuthorizationCodeStore::new(store.clone()),
            consents: ConsentStore::new(store),
        })
    }
}
