//! The token endpoint: password and authorization-code grants.

use crate::api::{client_credentials, resolve_realm_name};
use crate::errors::OAuthError;
use crate::openapi::OAUTH_TAG;
use crate::realms::{ClientRealm, UserRealm, SUB};
use crate::scopes::{join, realm_default_scopes, resolve_final_scopes, split_opt};
use crate::state::AppState;
use axum::extract::State;
use axum::routing::post;
use axum::{Form, Json, Router};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub(super) fn router() -> Router<AppState> {
    Router::new().route("/oauth2/access_token", post(access_token))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    grant_type: Option<String>,
    realm: Option<String>,
    username: Option<String>,
    password: Option<String>,
    scope: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    code: Option<String>,
    redirect_uri: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Identical to the access token; both are the same signed JWT.
    pub id_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub scope: String,
    pub realm: String,
}

#[utoipa::path(
    post,
    path = "/oauth2/access_token",
    tag = OAUTH_TAG,
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Invalid request or grant"),
        (status = 401, description = "Client authentication failed"),
    )
)]
async fn access_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, OAuthError> {
    match request.grant_type.as_deref() {
        Some("password") => password_grant(&state, &headers, request).await,
        Some("authorization_code") => authorization_code_grant(&state, &headers, request).await,
        other => Err(OAuthError::InvalidRequest(format!(
            "Unsupported grant type: {}",
            other.unwrap_or("<missing>")
        ))),
    }
}

/// Resource Owner Password Credentials grant (RFC 6749 section 4.3). The
/// client and the user are authenticated independently against their
/// respective realm backends.
async fn password_grant(
    state: &AppState,
    headers: &HeaderMap,
    request: TokenRequest,
) -> Result<Json<TokenResponse>, OAuthError> {
    let realm = resolve_realm_name(state, request.realm.as_deref(), headers)?;
    let (client_id, client_secret) =
        client_credentials(headers, request.client_id, request.client_secret)
            .map_err(|_| OAuthError::InvalidRequest("Client authentication failed".to_string()))?;

    let username = request.username.as_deref().unwrap_or("").trim();
    let password = request.password.as_deref().unwrap_or("");
    if username.is_empty() || password.trim().is_empty() {
        return Err(OAuthError::InvalidRequest(
            "Username and password should be provided.".to_string(),
        ));
    }

    let requested = split_opt(request.scope.as_deref());
    let defaults = realm_default_scopes(&state.settings, &realm);
    let final_scopes = resolve_final_scopes(&requested, &defaults);

    let client_realm = state.realms.client_realm(&realm)?;
    client_realm
        .authenticate(&client_id, &client_secret, &requested, &defaults)
        .await?;

    let user_realm = state.realms.user_realm(&realm)?;
    let claims = user_realm
        .authenticate(username, password, &requested, &defaults)
        .await?;

    issue_response(state, &realm, user_realm, final_scopes, claims)
}

/// Second leg of the authorization-code flow. The code is consumed
/// atomically before any further validation, so every code is single-use
/// regardless of the outcome.
async fn authorization_code_grant(
    state: &AppState,
    headers: &HeaderMap,
    request: TokenRequest,
) -> Result<Json<TokenResponse>, OAuthError> {
    let code = request
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| OAuthError::InvalidRequest("Missing code".to_string()))?;
    let redirect_uri = request
        .redirect_uri
        .filter(|u| !u.is_empty())
        .ok_or_else(|| OAuthError::InvalidRequest("Missing redirect_uri".to_string()))?;
    let (client_id, client_secret) =
        client_credentials(headers, request.client_id, request.client_secret)
            .map_err(|_| OAuthError::InvalidRequest("Client authentication failed".to_string()))?;

    let record = state.codes.redeem(&code, &client_id, &redirect_uri).await?;

    let client_realm = state.realms.client_realm(&record.realm)?;
    client_realm
        .authenticate(&client_id, &client_secret, &record.scopes, &record.scopes)
        .await?;

    let user_realm = state.realms.user_realm(&record.realm)?;
    issue_response(state, &record.realm, user_realm, record.scopes, record.claims)
}

fn issue_response(
    state: &AppState,
    realm: &str,
    user_realm: &impl UserRealm,
    scopes: std::collections::BTreeSet<String>,
    claims: std::collections::HashMap<String, String>,
) -> Result<Json<TokenResponse>, OAuthError> {
    let masked = claims
        .get(SUB)
        .map(|sub| user_realm.mask_subject(sub))
        .unwrap_or_default();
    let lifetime = state.settings.token_lifetime_secs(realm);
    let token = state
        .token_issuer
        .issue(realm, &scopes, &claims, lifetime, &masked)?;

    Ok(Json(TokenResponse {
        access_token: token.jwt.clone(),
        id_token: token.jwt,
        token_type: "Bearer",
        expires_in: token.expires_in,
        scope: join(&scopes),
        realm: realm.to_string(),
    }))
}
