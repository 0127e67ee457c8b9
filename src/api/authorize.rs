//! The authorization endpoint: login form, consent and the redirect legs of
//! the authorization-code and implicit grants.

use crate::api::resolve_realm_name;
use crate::errors::OAuthError;
use crate::openapi::OAUTH_TAG;
use crate::realms::{ClientRealm, RealmError, UserRealm, SUB};
use crate::scopes::{client_default_scopes, join, normalize, resolve_final_scopes, split_opt};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use http::header::LOCATION;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use url::Url;
use utoipa::ToSchema;

pub(super) fn router() -> Router<AppState> {
    Router::new().route("/oauth2/authorize", get(show_login_form).post(authorize))
}

const RESPONSE_TYPE_CODE: &str = "code";
const RESPONSE_TYPE_TOKEN: &str = "token";

#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizeParams {
    response_type: Option<String>,
    realm: Option<String>,
    client_id: String,
    scope: Option<String>,
    redirect_uri: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Everything the login form needs to echo back on submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginFormModel {
    pub response_type: String,
    pub realm: String,
    pub client_id: String,
    pub scope: String,
    pub redirect_uri: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    response_type: Option<String>,
    realm: Option<String>,
    client_id: String,
    scope: Option<String>,
    redirect_uri: String,
    state: Option<String>,
    username: String,
    password: String,
    /// "allow" or "deny" from the consent form; absent on first submission.
    decision: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConsentModel {
    pub client_name: String,
    pub client_description: String,
    pub scopes: BTreeSet<String>,
    pub response_type: String,
    pub realm: String,
    pub client_id: String,
    pub scope: String,
    pub redirect_uri: String,
    pub state: String,
    pub username: String,
    pub password: String,
    pub consent_needed: bool,
}

#[utoipa::path(
    get,
    path = "/oauth2/authorize",
    tag = OAUTH_TAG,
    params(
        ("response_type" = String, Query, description = "code or token"),
        ("client_id" = String, Query, description = "Requesting client"),
        ("realm" = Option<String>, Query, description = "Realm, inferred from Host when absent"),
    ),
    responses(
        (status = 200, description = "Login form model", body = LoginFormModel),
        (status = 400, description = "Invalid authorization request"),
    )
)]
async fn show_login_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AuthorizeParams>,
) -> Result<Json<LoginFormModel>, OAuthError> {
    let response_type = validated_response_type(params.response_type.as_deref())?;
    let realm = resolve_realm_name(&state, params.realm.as_deref(), &headers)?;

    let client_realm = state.realms.client_realm(&realm)?;
    let client = client_realm
        .get(&params.client_id)
        .await
        .map_err(OAuthError::from)?
        .ok_or_else(|| OAuthError::ClientAuthenticationFailed {
            client_id: params.client_id.clone(),
            realm: realm.clone(),
            reason: "client not found",
        })?;

    let redirect_uri = validated_redirect_uri(&client.redirect_uris, params.redirect_uri, &realm, &params.client_id)?;

    Ok(Json(LoginFormModel {
        response_type: response_type.to_string(),
        realm,
        client_id: params.client_id,
        scope: params.scope.unwrap_or_default(),
        redirect_uri,
        state: params.state.unwrap_or_default(),
        error: params.error,
    }))
}

#[utoipa::path(
    post,
    path = "/oauth2/authorize",
    tag = OAUTH_TAG,
    request_body(content = AuthorizeRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 302, description = "Redirect back to the client"),
        (status = 200, description = "Consent required", body = ConsentModel),
        (status = 400, description = "Invalid authorization request"),
    )
)]
async fn authorize(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(request): Form<AuthorizeRequest>,
) -> Result<Response, OAuthError> {
    let response_type = validated_response_type(request.response_type.as_deref())?;
    let realm = resolve_realm_name(&state, request.realm.as_deref(), &headers)?;

    let client_realm = state.realms.client_realm(&realm)?;
    let client = client_realm
        .get(&request.client_id)
        .await
        .map_err(OAuthError::from)?
        .ok_or_else(|| OAuthError::ClientAuthenticationFailed {
            client_id: request.client_id.clone(),
            realm: realm.clone(),
            reason: "client not found",
        })?;

    if request.redirect_uri.is_empty() {
        return Err(OAuthError::InvalidRequest("Missing redirect_uri".to_string()));
    }
    if !client.redirect_uris.contains(&request.redirect_uri) {
        return Err(OAuthError::RedirectUriMismatch {
            realm,
            client_id: request.client_id,
        });
    }

    // Tokens in a redirect URI must never reach a client that could instead
    // prove its identity on the token endpoint.
    if response_type == RESPONSE_TYPE_TOKEN && client.confidential {
        return Err(OAuthError::InvalidRequest(
            "Invalid response_type 'token' for confidential client".to_string(),
        ));
    }

    let requested = split_opt(request.scope.as_deref());
    let defaults = client_default_scopes(&state.settings, &realm, &client);
    let final_scopes = resolve_final_scopes(&requested, &defaults);

    let user_realm = state.realms.user_realm(&realm)?;
    let claims = match user_realm
        .authenticate(&request.username, &request.password, &final_scopes, &defaults)
        .await
    {
        Ok(claims) => claims,
        // Wrong credentials send the browser back to the login form with an
        // error marker and all its parameters intact.
        Err(RealmError::UserAuthenticationFailed { username, realm: failed_realm }) => {
            log::info!(
                "user authentication failed for '{}' in realm {}; redirecting to login form",
                username,
                failed_realm
            );
            return Ok(login_retry_redirect(response_type, &request));
        }
        Err(err) => return Err(err.into()),
    };

    let consented = match request.decision.as_deref() {
        Some("allow") => {
            state
                .consents
                .store(&request.username, &realm, &request.client_id, final_scopes.clone())
                .await?;
            final_scopes.clone()
        }
        Some("deny") => {
            let mut url = parse_redirect_uri(&request.redirect_uri)?;
            url.query_pairs_mut()
                .append_pair("error", "access_denied")
                .append_pair("state", request.state.as_deref().unwrap_or(""));
            return Ok(found(url));
        }
        _ => {
            state
                .consents
                .consented_scopes(&request.username, &realm, &request.client_id)
                .await?
        }
    };

    if !final_scopes.is_subset(&consented) {
        return Ok(consent_response(&headers, &client, &request, response_type, &realm, final_scopes));
    }

    let mut url = parse_redirect_uri(&request.redirect_uri)?;
    let state_param = request.state.as_deref().unwrap_or("");
    match response_type {
        RESPONSE_TYPE_CODE => {
            let code = state
                .codes
                .create(
                    state_param,
                    &request.client_id,
                    &realm,
                    final_scopes,
                    claims,
                    &request.redirect_uri,
                )
                .await?;
            url.query_pairs_mut()
                .append_pair("code", &code)
                .append_pair("state", state_param);
        }
        _ => {
            let masked = claims
                .get(SUB)
                .map(|sub| user_realm.mask_subject(sub))
                .unwrap_or_default();
            let lifetime = state.settings.token_lifetime_secs(&realm);
            let token = state
                .token_issuer
                .issue(&realm, &final_scopes, &claims, lifetime, &masked)?;
            url.query_pairs_mut()
                .append_pair("access_token", &token.jwt)
                .append_pair("token_type", "Bearer")
                .append_pair("expires_in", &token.expires_in.to_string())
                .append_pair("scope", &join(&final_scopes))
                .append_pair("state", state_param);
        }
    }
    Ok(found(url))
}

fn validated_response_type(response_type: Option<&str>) -> Result<&str, OAuthError> {
    match response_type {
        Some(rt @ (RESPONSE_TYPE_CODE | RESPONSE_TYPE_TOKEN)) => Ok(rt),
        other => Err(OAuthError::InvalidRequest(format!(
            "Unsupported response_type: {}",
            other.unwrap_or("<missing>")
        ))),
    }
}

/// The effective redirect URI: an explicit parameter must match one of the
/// client's registered URIs; without a parameter the first registered URI is
/// used.
fn validated_redirect_uri(
    registered: &BTreeSet<String>,
    param: Option<String>,
    realm: &str,
    client_id: &str,
) -> Result<String, OAuthError> {
    match param.filter(|uri| !uri.is_empty()) {
        Some(uri) => {
            if registered.contains(&uri) {
                Ok(uri)
            } else {
                Err(OAuthError::RedirectUriMismatch {
                    realm: realm.to_string(),
                    client_id: client_id.to_string(),
                })
            }
        }
        None => registered
            .iter()
            .next()
            .cloned()
            .ok_or_else(|| OAuthError::InvalidRequest("Missing redirect_uri".to_string())),
    }
}

fn parse_redirect_uri(uri: &str) -> Result<Url, OAuthError> {
    Url::parse(uri).map_err(|_| OAuthError::InvalidRequest("Invalid redirect_uri".to_string()))
}

/// axum's Redirect uses 303; the OAuth flows conventionally answer 302.
fn found(url: Url) -> Response {
    (StatusCode::FOUND, [(LOCATION, url.to_string())]).into_response()
}

fn login_retry_redirect(response_type: &str, request: &AuthorizeRequest) -> Response {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("response_type", response_type)
        .append_pair("realm", request.realm.as_deref().unwrap_or(""))
        .append_pair("client_id", &request.client_id)
        .append_pair("scope", &normalize(request.scope.as_deref().unwrap_or("")))
        .append_pair("redirect_uri", &request.redirect_uri)
        .append_pair("state", request.state.as_deref().unwrap_or(""))
        .append_pair("error", "access_denied")
        .finish();
    let location = format!("/oauth2/authorize?{query}");
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

/// The consent step: JSON for API clients, a minimal HTML form otherwise.
fn consent_response(
    headers: &HeaderMap,
    client: &crate::models::ClientData,
    request: &AuthorizeRequest,
    response_type: &str,
    realm: &str,
    scopes: BTreeSet<String>,
) -> Response {
    let model = ConsentModel {
        client_name: client.name.clone(),
        client_description: client.description.clone(),
        scope: join(&scopes),
        scopes,
        response_type: response_type.to_string(),
        realm: realm.to_string(),
        client_id: request.client_id.clone(),
        redirect_uri: request.redirect_uri.clone(),
        state: request.state.as_deref().unwrap_or("").to_string(),
        username: request.username.clone(),
        password: request.password.clone(),
        consent_needed: true,
    };

    let wants_json = headers
        .get(http::header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"));
    if wants_json {
        return Json(model).into_response();
    }
    Html(render_consent_form(&model)).into_response()
}

fn render_consent_form(model: &ConsentModel) -> String {
    let scope_list: String = model
        .scopes
        .iter()
        .map(|scope| format!("<li>{}</li>", escape_html(scope)))
        .collect();
    format!(
        concat!(
            "<!DOCTYPE html><html><head><title>Consent</title></head><body>",
            "<h1>{name}</h1><p>{description}</p>",
            "<p>The application requests access to:</p><ul>{scopes}</ul>",
            "<form method=\"post\" action=\"/oauth2/authorize\">",
            "<input type=\"hidden\" name=\"response_type\" value=\"{response_type}\"/>",
            "<input type=\"hidden\" name=\"realm\" value=\"{realm}\"/>",
            "<input type=\"hidden\" name=\"client_id\" value=\"{client_id}\"/>",
            "<input type=\"hidden\" name=\"scope\" value=\"{scope}\"/>",
            "<input type=\"hidden\" name=\"redirect_uri\" value=\"{redirect_uri}\"/>",
            "<input type=\"hidden\" name=\"state\" value=\"{state}\"/>",
            "<input type=\"hidden\" name=\"username\" value=\"{username}\"/>",
            "<input type=\"hidden\" name=\"password\" value=\"{password}\"/>",
            "<button name=\"decision\" value=\"allow\">Allow</button>",
            "<button name=\"decision\" value=\"deny\">Deny</button>",
            "</form></body></html>"
        ),
        name = escape_html(&model.client_name),
        description = escape_html(&model.client_description),
        scopes = scope_list,
        response_type = escape_html(&model.response_type),
        realm = escape_html(&model.realm),
        client_id = escape_html(&model.client_id),
        scope = escape_html(&model.scope),
        redirect_uri = escape_html(&model.redirect_uri),
        state = escape_html(&model.state),
        username = escape_html(&model.username),
        password = escape_html(&model.password),
    )
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
