//! User realm delegating the credential check to another OAuth2 provider.
//!
//! Authentication is a two-step dance: obtain a token from the upstream
//! token endpoint with the user's credentials, then resolve that token into
//! a user id through the upstream token-info endpoint.

use super::{RealmError, UserRealm, SUB};
use crate::config::UpstreamConfig;
use crate::scopes;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct TokenInfoResponse {
    uid: String,
}

#[derive(Clone)]
pub struct UpstreamUserRealm {
    realm_name: String,
    token_url: String,
    token_info_url: String,
    client: Client,
}

impl UpstreamUserRealm {
    pub fn new(realm_name: String, config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(2))
            .build()?;
        Ok(Self {
            realm_name,
            token_url: config.token_url.clone(),
            token_info_url: config.token_info_url.clone(),
            client,
        })
    }

    async fn get_access_token(
        &self,
        username: &str,
        password: &str,
        scopes: &BTreeSet<String>,
    ) -> Result<String, RealmError> {
        let mut query: Vec<(&str, String)> = vec![("realm", self.realm_name.clone())];
        if !scopes.is_empty() {
            query.push(("scope", scopes::join(scopes)));
        }

        let basic = BASE64.encode(format!("{username}:{password}"));
        let response = self
            .client
            .get(&self.token_url)
            .query(&query)
            .header(http::header::AUTHORIZATION, format!("Basic {basic}"))
            .send()
            .await
            .map_err(|e| RealmError::Remote(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(RealmError::UserAuthenticationFailed {
                username: username.to_string(),
                realm: self.realm_name.clone(),
            });
        }
        if !status.is_success() {
            return Err(RealmError::Remote(format!(
                "upstream token endpoint returned {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RealmError::Remote(e.to_string()))?;
        // The upstream responds with the bare token text.
        Ok(body.split_whitespace().collect())
    }

    async fn get_token_info(
        &self,
        username: &str,
        token: &str,
    ) -> Result<TokenInfoResponse, RealmError> {
        let response = self
            .client
            .get(&self.token_info_url)
            .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await
            .map_err(|e| RealmError::Remote(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(RealmError::UserAuthenticationFailed {
                username: username.to_string(),
                realm: self.realm_name.clone(),
            });
        }
        if !status.is_success() {
            return Err(RealmError::Remote(format!(
                "upstream token-info endpoint returned {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RealmError::Remote(e.to_string()))
    }
}

#[async_trait::async_trait]
impl UserRealm for UpstreamUserRealm {
    fn name(&self) -> &str {
        &self.realm_name
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        scopes: &BTreeSet<String>,
        _default_scopes: &BTreeSet<String>,
    ) -> Result<HashMap<String, String>, RealmError> {
        let token = self.get_access_token(username, password, scopes).await?;
        let info = self.get_token_info(username, &token).await?;
        Ok(HashMap::from([(SUB.to_string(), info.uid)]))
    }
}
