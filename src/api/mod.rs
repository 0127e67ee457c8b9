pub(crate) mod admin;
pub(crate) mod authorize;
pub(crate) mod discovery;
pub(crate) mod health;
pub(crate) mod token;

use crate::errors::OAuthError;
use crate::state::AppState;
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http::HeaderMap;

/// Combines all API routes into a single router
pub(super) fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(discovery::router())
        .merge(authorize::router())
        .merge(token::router())
        .merge(admin::router())
}

/// Resolve the realm from an explicit parameter, falling back to inference
/// from the request's Host header.
pub(crate) fn resolve_realm_name(
    state: &AppState,
    realm_param: Option<&str>,
    headers: &HeaderMap,
) -> Result<String, OAuthError> {
    if let Some(realm) = realm_param.filter(|r| !r.is_empty()) {
        return Ok(crate::realms::ensure_leading_slash(realm));
    }
    let host = headers
        .get(http::header::HOST)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            OAuthError::InvalidRequest("Missing realm parameter and no Host header.".to_string())
        })?;
    state
        .realms
        .find_realm_in_host(host)
        .map(str::to_string)
        .ok_or_else(|| OAuthError::RealmNotFound(host.to_string()))
}

/// Client credentials from explicit form fields or the HTTP Basic header,
/// in that order of preference.
pub(crate) fn client_credentials(
    headers: &HeaderMap,
    client_id: Option<String>,
    client_secret: Option<String>,
) -> Result<(String, String), OAuthError> {
    if let (Some(id), Some(secret)) = (client_id, client_secret) {
        return Ok((id, secret));
    }
    basic_credentials(headers)
}

fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), OAuthError> {
    let malformed =
        || OAuthError::InvalidRequest("Malformed or missing Authorization header.".to_string());

    let authorization = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(malformed)?;
    let encoded = authorization
        .strip_prefix("Basic ")
        .or_else(|| authorization.strip_prefix("basic "))
        .ok_or_else(malformed)?;
    let decoded = BASE64.decode(encoded.trim()).map_err(|_| malformed())?;
    let decoded = String::from_utf8(decoded).map_err(|_| malformed())?;
    let (id, secret) = decoded.split_once(':').ok_or_else(malformed)?;
    Ok((id.to_string(), secret.to_string()))
}
