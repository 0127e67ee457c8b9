//! User realm backed by the legacy customer directory. Usernames here are
//! e-mail addresses, so every log line goes through the e-mail mask.

use super::{mask_email, RealmError, UserRealm, SUB};
use crate::config::CustomerConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

const SUCCESS_STATUS: &str = "SUCCESS";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    app_domain_id: u32,
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    login_result: String,
    #[serde(default)]
    customer_number: String,
}

#[derive(Clone)]
pub struct CustomerUserRealm {
    realm_name: String,
    service_url: String,
    app_domain_id: u32,
    client: Client,
}

impl CustomerUserRealm {
    pub fn new(realm_name: String, config: &CustomerConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(2))
            .build()?;
        Ok(Self {
            realm_name,
            service_url: config.service_url.clone(),
            app_domain_id: config.app_domain_id,
            client,
        })
    }

    fn auth_failure(&self, username: &str) -> RealmError {
        RealmError::UserAuthenticationFailed {
            username: mask_email(username),
            realm: self.realm_name.clone(),
        }
    }
}

#[async_trait::async_trait]
impl UserRealm for CustomerUserRealm {
    fn name(&self) -> &str {
        &self.realm_name
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        _scopes: &BTreeSet<String>,
        _default_scopes: &BTreeSet<String>,
    ) -> Result<HashMap<String, String>, RealmError> {
        let response = self
            .client
            .post(&self.service_url)
            .json(&LoginRequest {
                app_domain_id: self.app_domain_id,
                username,
                password,
            })
            .send()
            .await
            .map_err(|e| RealmError::Remote(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(self.auth_failure(username));
        }
        if !status.is_success() {
            return Err(RealmError::Remote(format!(
                "customer login service returned {status}"
            )));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| RealmError::Remote(e.to_string()))?;
        if login.login_result != SUCCESS_STATUS {
            return Err(self.auth_failure(username));
        }

        Ok(HashMap::from([(SUB.to_string(), login.customer_number)]))
    }

    fn mask_subject(&self, sub: &str) -> String {
        mask_email(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scopes::split;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn realm_against(server: &MockServer) -> CustomerUserRealm {
        let config = CustomerConfig {
            service_url: format!("{}/login", server.uri()),
            app_domain_id: 1,
            timeout_secs: 2,
        };
        CustomerUserRealm::new("/customers".to_string(), &config).unwrap()
    }

    #[tokio::test]
    async fn successful_login_maps_customer_number_to_sub() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_json(serde_json::json!({
                "app_domain_id": 1,
                "username": "jane.doe@example.com",
                "password": "pw",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "login_result": "SUCCESS",
                "customer_number": "135296708",
            })))
            .mount(&server)
            .await;

        let realm = realm_against(&server).await;
        let claims = realm
            .authenticate("jane.doe@example.com", "pw", &split(""), &split(""))
            .await
            .unwrap();
        assert_eq!(claims.get(SUB).map(String::as_str), Some("135296708"));
    }

    #[tokio::test]
    async fn failed_login_masks_the_email_address() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "login_result": "FAILED",
            })))
            .mount(&server)
            .await;

        let realm = realm_against(&server).await;
        let err = realm
            .authenticate("jane.doe@example.com", "bad", &split(""), &split(""))
            .await
            .unwrap_err();
        match err {
            RealmError::UserAuthenticationFailed { username, .. } => {
                assert!(!username.contains("jane.doe"));
                assert!(username.starts_with("ja***@***.com"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn service_5xx_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let realm = realm_against(&server).await;
        let err = realm
            .authenticate("jane.doe@example.com", "pw", &split(""), &split(""))
            .await
            .unwrap_err();
        assert!(matches!(err, RealmError::Remote(_)));
    }
}
