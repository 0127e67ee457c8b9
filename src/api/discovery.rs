//! OpenID Connect discovery document and the public JWK set.

use crate::errors::OAuthError;
use crate::openapi::DISCOVERY_TAG;
use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use http::HeaderMap;
use serde::Serialize;
use utoipa::ToSchema;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/.well-known/openid-configuration", get(openid_configuration))
        .route("/oauth2/connect/keys", get(jwks))
        .route("/oauth2/v3/certs", get(jwks))
}

const SIGNING_ALGORITHMS: [&str; 9] = [
    "RS256", "RS384", "RS512", "PS256", "PS384", "PS512", "ES256", "ES384", "ES512",
];

#[derive(Debug, Serialize, ToSchema)]
pub struct DiscoveryResponse {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<&'static str>,
    pub id_token_signing_alg_values_supported: Vec<&'static str>,
}

/// Base URL as seen by the caller, honoring the proxy's X-Forwarded-Proto.
fn external_base_url(headers: &HeaderMap) -> Result<String, OAuthError> {
    let host = headers
        .get(http::header::HOST)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| OAuthError::InvalidRequest("Missing Host header".to_string()))?;
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    Ok(format!("{proto}://{host}"))
}

#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    tag = DISCOVERY_TAG,
    responses(
        (status = 200, description = "Discovery document", body = DiscoveryResponse),
    )
)]
async fn openid_configuration(
    headers: HeaderMap,
) -> Result<Json<DiscoveryResponse>, OAuthError> {
    let base = external_base_url(&headers)?;
    Ok(Json(DiscoveryResponse {
        issuer: base.clone(),
        authorization_endpoint: format!("{base}/oauth2/authorize"),
        token_endpoint: format!("{base}/oauth2/access_token"),
        jwks_uri: format!("{base}/oauth2/connect/keys"),
        response_types_supported: vec!["code", "token"],
        id_token_signing_alg_values_supported: SIGNING_ALGORITHMS.to_vec(),
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JwksResponse {
    pub keys: Vec<crate::keys::jwk::Jwk>,
}

#[utoipa::path(
    get,
    path = "/oauth2/connect/keys",
    tag = DISCOVERY_TAG,
    responses(
        (status = 200, description = "Public signing keys", body = JwksResponse),
    )
)]
async fn jwks(State(state): State<AppState>) -> Json<JwksResponse> {
    Json(JwksResponse {
        keys: state.key_holder.public_jwks(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_defaults_to_http() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::HOST, "auth.example.org".parse().unwrap());
        assert_eq!(
            external_base_url(&headers).unwrap(),
            "http://auth.example.org"
        );
    }

    #[test]
    fn base_url_honors_forwarded_proto() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::HOST, "auth.example.org".parse().unwrap());
        headers.insert("x-forwarded-proto", "https".parse().unwrap());
        assert_eq!(
            external_base_url(&headers).unwrap(),
            "https://auth.example.org"
        );
    }

    #[test]
    fn missing_host_is_an_error() {
        assert!(external_base_url(&HeaderMap::new()).is_err());
    }
}

#[cfg(test)]
mod endpoint_tests {
    use crate::test_utils::TestFixture;

    #[tokio::test]
    async fn discovery_document_derives_urls_from_the_host() {
        let fixture = TestFixture::new().await;

        let response = fixture.get("/.well-known/openid-configuration").await;
        response.assert_ok();
        assert_eq!(response.json["issuer"], "http://localhost");
        assert_eq!(
            response.json["token_endpoint"],
            "http://localhost/oauth2/access_token"
        );
        assert_eq!(
            response.json["jwks_uri"],
            "http://localhost/oauth2/connect/keys"
        );
        assert_eq!(
            response.json["response_types_supported"],
            serde_json::json!(["code", "token"])
        );
    }

    #[tokio::test]
    async fn jwks_exposes_the_public_key_on_both_paths() {
        let fixture = TestFixture::new().await;

        for uri in ["/oauth2/connect/keys", "/oauth2/v3/certs"] {
            let response = fixture.get(uri).await;
            response.assert_ok();
            let keys = response.json["keys"].as_array().unwrap();
            assert_eq!(keys.len(), 1);
            assert_eq!(keys[0]["kid"], "test-key");
            assert_eq!(keys[0]["kty"], "RSA");
            assert_eq!(keys[0]["use"], "sig");
            assert!(keys[0]["n"].is_string());
            // no private key material leaks
            assert!(keys[0].get("d").is_none());
        }
    }
}
