use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde_json::json;
use std::collections::BTreeSet;
use thiserror::Error;

/// Why an authorization code failed to redeem.
///
/// All three cases map to 400; the message distinguishes them so operators
/// can tell a replayed code from a confused (or malicious) client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeFailure {
    NotFoundOrExpired,
    ClientMismatch,
    RedirectUriMismatch,
}

/// The single error taxonomy of the authorization server.
///
/// Every variant carries enough payload for logging; `client_message`
/// deliberately flattens some of that detail (e.g. "client not found" vs
/// "wrong secret") into a uniform client-facing message.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("realm '{0}' not found")]
    RealmNotFound(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("client authentication failed for {client_id} in realm {realm}: {reason}")]
    ClientAuthenticationFailed {
        client_id: String,
        realm: String,
        reason: &'static str,
    },
    #[error("client {client_id} in realm {realm} requested invalid scopes: {missing:?}")]
    ClientScopeInvalid {
        client_id: String,
        realm: String,
        missing: BTreeSet<String>,
    },
    /// The username here is already masked by the realm that raised it.
    #[error("user authentication failed for '{username}' in realm {realm}")]
    UserAuthenticationFailed { username: String, realm: String },
    #[error("user '{username}' in realm {realm} requested invalid scopes: {missing:?}")]
    UserScopeInvalid {
        username: String,
        realm: String,
        missing: BTreeSet<String>,
    },
    #[error("invalid authorization code ({0:?})")]
    AuthorizationCodeInvalid(CodeFailure),
    #[error("redirect URI mismatch for client {realm}/{client_id}")]
    RedirectUriMismatch { realm: String, client_id: String },
    #[error("{0}")]
    NotFound(String),
    #[error("realm '{0}' is not managed")]
    RealmNotManaged(String),
    #[error("upstream request failed: {0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
}

impl OAuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            OAuthError::ClientAuthenticationFailed { .. } => StatusCode::UNAUTHORIZED,
            OAuthError::NotFound(_) => StatusCode::NOT_FOUND,
            OAuthError::Upstream(_) => StatusCode::BAD_GATEWAY,
            OAuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Machine-readable OAuth error token.
    pub fn error_token(&self) -> &'static str {
        match self {
            OAuthError::RealmNotFound(_) => "realm_not_found",
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::ClientAuthenticationFailed { .. } => "invalid_client",
            OAuthError::ClientScopeInvalid { .. } => "invalid_scope",
            OAuthError::UserAuthenticationFailed { .. } => "invalid_grant",
            OAuthError::UserScopeInvalid { .. } => "invalid_scope",
            OAuthError::AuthorizationCodeInvalid(_) => "invalid_request",
            OAuthError::RedirectUriMismatch { .. } => "invalid_request",
            OAuthError::NotFound(_) => "not_found",
            OAuthError::RealmNotManaged(_) => "invalid_request",
            OAuthError::Upstream(_) => "temporarily_unavailable",
            OAuthError::Internal(_) => "server_error",
        }
    }

    /// Message rendered to the client. Must not leak whether a client exists
    /// or which part of its credentials was wrong.
    pub fn client_message(&self) -> String {
        match self {
            OAuthError::RealmNotFound(realm) => format!("Realm '{realm}' not found"),
            OAuthError::InvalidRequest(msg) => msg.clone(),
            OAuthError::ClientAuthenticationFailed { .. } => {
                "Client authentication failed".to_string()
            }
            OAuthError::ClientScopeInvalid { missing, .. }
            | OAuthError::UserScopeInvalid { missing, .. } => {
                let scopes: Vec<&str> = missing.iter().map(String::as_str).collect();
                format!("Invalid scopes: {}", scopes.join(" "))
            }
            OAuthError::UserAuthenticationFailed { .. } => "User authentication failed".to_string(),
            OAuthError::AuthorizationCodeInvalid(failure) => match failure {
                CodeFailure::NotFoundOrExpired => "Invalid authorization code".to_string(),
                CodeFailure::ClientMismatch => {
                    "Invalid authorization code: client mismatch".to_string()
                }
                CodeFailure::RedirectUriMismatch => {
                    "Invalid authorization code: redirect_uri mismatch".to_string()
                }
            },
            OAuthError::RedirectUriMismatch { .. } => "Redirect URI mismatch".to_string(),
            OAuthError::NotFound(msg) => msg.clone(),
            OAuthError::RealmNotManaged(realm) => format!("Realm '{realm}' is not managed"),
            OAuthError::Upstream(_) => "Upstream authentication backend unavailable".to_string(),
            OAuthError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{self}");
        } else {
            log::info!("{self} (status {status})");
        }
        let body = json!({
            "error": self.error_token(),
            "error_message": self.client_message(),
        });
        (status, Json(body)).into_response()
    }
}
