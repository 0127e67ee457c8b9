//! Administrative endpoints for clients, users and consents.
//!
//! These write directly to the store and only work against store-backed
//! realms. They are meant to sit behind a private network boundary, mirroring
//! how the data would otherwise be replicated in by a sync job.

use crate::errors::OAuthError;
use crate::models::{ClientData, PasswordHash, UserData};
use crate::openapi::ADMIN_TAG;
use crate::scopes::join;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use utoipa::ToSchema;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/raw-sync/clients/{realm}/{client_id}", put(put_client))
        .route("/raw-sync/clients/{realm}/{client_id}", delete(delete_client))
        .route("/raw-sync/users/{realm}/{username}", put(put_user))
        .route("/raw-sync/users/{realm}/{username}", delete(delete_user))
        .route("/raw-sync/users/{realm}/{username}/password", put(put_password))
        .route("/consents/{realm}/{username}/{client_id}", get(get_consent))
        .route("/consents/{realm}/{username}/{client_id}", post(post_consent))
        .route("/consents/{realm}/{username}/{client_id}", delete(delete_consent))
}

#[utoipa::path(
    put,
    path = "/raw-sync/clients/{realm}/{client_id}",
    tag = ADMIN_TAG,
    request_body = ClientData,
    responses(
        (status = 200, description = "Client stored"),
        (status = 400, description = "Realm is not managed"),
    )
)]
async fn put_client(
    State(state): State<AppState>,
    Path((realm, client_id)): Path<(String, String)>,
    Json(client): Json<ClientData>,
) -> Result<StatusCode, OAuthError> {
    state
        .realms
        .managed_client_realm(&realm)?
        .create_or_replace(&client_id, &client)
        .await?;
    log::info!("stored client {client_id} in realm {realm}");
    Ok(StatusCode::OK)
}

#[utoipa::path(
    delete,
    path = "/raw-sync/clients/{realm}/{client_id}",
    tag = ADMIN_TAG,
    responses(
        (status = 200, description = "Client deleted"),
        (status = 404, description = "No such client"),
    )
)]
async fn delete_client(
    State(state): State<AppState>,
    Path((realm, client_id)): Path<(String, String)>,
) -> Result<StatusCode, OAuthError> {
    state
        .realms
        .managed_client_realm(&realm)?
        .delete(&client_id)
        .await?;
    log::info!("deleted client {client_id} from realm {realm}");
    Ok(StatusCode::OK)
}

#[utoipa::path(
    put,
    path = "/raw-sync/users/{realm}/{username}",
    tag = ADMIN_TAG,
    request_body = UserData,
    responses(
        (status = 200, description = "User stored"),
        (status = 400, description = "Realm is not managed"),
    )
)]
async fn put_user(
    State(state): State<AppState>,
    Path((realm, username)): Path<(String, String)>,
    Json(user): Json<UserData>,
) -> Result<StatusCode, OAuthError> {
    state
        .realms
        .managed_user_realm(&realm)?
        .create_or_replace(&username, &user)
        .await?;
    log::info!("stored user {username} in realm {realm}");
    Ok(StatusCode::OK)
}

#[utoipa::path(
    delete,
    path = "/raw-sync/users/{realm}/{username}",
    tag = ADMIN_TAG,
    responses(
        (status = 200, description = "User deleted"),
        (status = 404, description = "No such user"),
    )
)]
async fn delete_user(
    State(state): State<AppState>,
    Path((realm, username)): Path<(String, String)>,
) -> Result<StatusCode, OAuthError> {
    state
        .realms
        .managed_user_realm(&realm)?
        .delete(&username)
        .await?;
    log::info!("deleted user {username} from realm {realm}");
    Ok(StatusCode::OK)
}

#[utoipa::path(
    put,
    path = "/raw-sync/users/{realm}/{username}/password",
    tag = ADMIN_TAG,
    request_body = PasswordHash,
    responses(
        (status = 200, description = "Password hash appended"),
        (status = 404, description = "No such user"),
    )
)]
async fn put_password(
    State(state): State<AppState>,
    Path((realm, username)): Path<(String, String)>,
    Json(password): Json<PasswordHash>,
) -> Result<StatusCode, OAuthError> {
    state
        .realms
        .managed_user_realm(&realm)?
        .add_password(&username, password)
        .await?;
    log::info!("added password for user {username} in realm {realm}");
    Ok(StatusCode::OK)
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConsentBody {
    pub scopes: BTreeSet<String>,
}

#[utoipa::path(
    get,
    path = "/consents/{realm}/{username}/{client_id}",
    tag = ADMIN_TAG,
    responses(
        (status = 200, description = "Stored consent, possibly empty", body = ConsentBody),
    )
)]
async fn get_consent(
    State(state): State<AppState>,
    Path((realm, username, client_id)): Path<(String, String, String)>,
) -> Result<Json<ConsentBody>, OAuthError> {
    let scopes = state
        .consents
        .consented_scopes(&username, &crate::realms::ensure_leading_slash(&realm), &client_id)
        .await?;
    Ok(Json(ConsentBody { scopes }))
}

#[utoipa::path(
    post,
    path = "/consents/{realm}/{username}/{client_id}",
    tag = ADMIN_TAG,
    request_body = ConsentBody,
    responses(
        (status = 201, description = "Consent stored"),
    )
)]
async fn post_consent(
    State(state): State<AppState>,
    Path((realm, username, client_id)): Path<(String, String, String)>,
    Json(body): Json<ConsentBody>,
) -> Result<StatusCode, OAuthError> {
    let realm = crate::realms::ensure_leading_slash(&realm);
    log::info!(
        "storing consent for {username}/{client_id} in realm {realm}: {}",
        join(&body.scopes)
    );
    state
        .consents
        .store(&username, &realm, &client_id, body.scopes)
        .await?;
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    delete,
    path = "/consents/{realm}/{username}/{client_id}",
    tag = ADMIN_TAG,
    responses(
        (status = 204, description = "Consent withdrawn"),
    )
)]
async fn delete_consent(
    State(state): State<AppState>,
    Path((realm, username, client_id)): Path<(String, String, String)>,
) -> Result<StatusCode, OAuthError> {
    state
        .consents
        .withdraw(&username, &crate::realms::ensure_leading_slash(&realm), &client_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PasswordHash;
    use crate::scopes::split;
    use crate::test_utils::TestFixture;
    use http::StatusCode;

    #[tokio::test]
    async fn client_sync_round_trip() {
        let fixture = TestFixture::new().await;
        let client = TestFixture::confidential_client();

        fixture
            .put_json("/raw-sync/clients/services/syncedapp", &client)
            .await
            .assert_ok();

        // the synced client can authenticate right away
        let response = fixture
            .post_form(
                "/oauth2/access_token",
                &[
                    ("grant_type", "password"),
                    ("realm", "services"),
                    ("username", "nobody"),
                    ("password", "irrelevant"),
                    ("client_id", "syncedapp"),
                    ("client_secret", "app-secret"),
                ],
            )
            .await;
        // user does not exist, but the client got past authentication
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json["error_message"], "User authentication failed");

        fixture
            .delete("/raw-sync/clients/services/syncedapp")
            .await
            .assert_ok();
        fixture
            .delete("/raw-sync/clients/services/syncedapp")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn user_sync_and_password_rotation() {
        let fixture = TestFixture::new().await;
        fixture
            .seed_client("/services", "testapp", &TestFixture::confidential_client())
            .await;

        fixture
            .put_json("/raw-sync/users/services/alice", &TestFixture::store_user())
            .await
            .assert_ok();
        fixture
            .put_json(
                "/raw-sync/users/services/alice/password",
                &PasswordHash {
                    hash: bcrypt::hash("rotated-pass", 4).unwrap(),
                    created: 1,
                    created_by: "test".to_string(),
                },
            )
            .await
            .assert_ok();

        // both the original and the rotated password work
        for password in ["user-pass", "rotated-pass"] {
            fixture
                .post_form(
                    "/oauth2/access_token",
                    &[
                        ("grant_type", "password"),
                        ("realm", "services"),
                        ("username", "alice"),
                        ("password", password),
                        ("scope", "uid"),
                        ("client_id", "testapp"),
                        ("client_secret", "app-secret"),
                    ],
                )
                .await
                .assert_ok();
        }

        fixture
            .delete("/raw-sync/users/services/alice")
            .await
            .assert_ok();
    }

    #[tokio::test]
    async fn unmanaged_realms_reject_user_writes() {
        let fixture = TestFixture::new().await;

        let response = fixture
            .put_json("/raw-sync/users/employees/jdoe", &TestFixture::store_user())
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json["error_message"],
            "Realm '/employees' is not managed"
        );
    }

    #[tokio::test]
    async fn password_for_unknown_user_is_not_found() {
        let fixture = TestFixture::new().await;

        fixture
            .put_json(
                "/raw-sync/users/services/ghost/password",
                &PasswordHash {
                    hash: bcrypt::hash("x", 4).unwrap(),
                    created: 0,
                    created_by: "test".to_string(),
                },
            )
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn consent_crud() {
        let fixture = TestFixture::new().await;

        fixture
            .post_json(
                "/consents/services/alice/testapp",
                &ConsentBody { scopes: split("uid team.read") },
            )
            .await
            .assert_status(StatusCode::CREATED);

        let response = fixture.get("/consents/services/alice/testapp").await;
        response.assert_ok();
        assert_eq!(response.json["scopes"], serde_json::json!(["team.read", "uid"]));

        fixture
            .delete("/consents/services/alice/testapp")
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let response = fixture.get("/consents/services/alice/testapp").await;
        response.assert_ok();
        assert_eq!(response.json["scopes"], serde_json::json!([]));
    }
}
