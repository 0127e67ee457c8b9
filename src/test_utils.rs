use crate::config::Settings;
use crate::create_app;
use crate::keys::test_keys::RSA_PEM;
use crate::models::{ClientData, PasswordHash, SigningKeyRecord, UserData};
use crate::state::AppState;
use crate::store::{memory::MemoryStore, Store, StoreBackend, SIGNING_KEYS_KEY};
use axum::body::Body;
use axum::Router;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tower::ServiceExt;
use wiremock::MockServer;

/// Test fixture for a complete in-process server with mocked remote realms.
///
/// Realms are wired as `/services` (store/store), `/employees`
/// (store/upstream) and `/customers` (store/customer), all against an
/// in-memory store that tests can seed directly. `/services` carries a
/// realm-wide default scope of `uid`. A single RSA signing key serving
/// every realm is loaded before the application starts.
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Configuration settings
    pub settings: Settings,
    /// The store backing all realms, for direct seeding
    pub store: Store,
    /// Mock server standing in for the upstream token provider
    pub upstream_mock: MockServer,
    /// Mock server standing in for the customer login service
    pub customer_mock: MockServer,
}

impl TestFixture {
    pub async fn new() -> Self {
        let _ = env_logger::builder()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();

        let upstream_mock = MockServer::start().await;
        let customer_mock = MockServer::start().await;
        let settings = Settings::for_test_with_mocks(&upstream_mock, &customer_mock);

        let store = Store::Memory(MemoryStore::new());
        // Signing keys must be in place before the state's initial refresh.
        store
            .set(
                SIGNING_KEYS_KEY,
                &vec![SigningKeyRecord {
                    kid: "test-key".to_string(),
                    realms: BTreeSet::from([
                        "/services".to_string(),
                        "/employees".to_string(),
                        "/customers".to_string(),
                    ]),
                    private_key_pem: RSA_PEM.clone(),
                    algorithm: "RS256".to_string(),
                    valid_from: 0,
                }],
            )
            .await
            .expect("Failed to seed signing key");

        let state = AppState::with_existing_store(settings.clone(), store.clone())
            .await
            .expect("Failed to initialize application state");
        let app = create_app(state);

        Self {
            app,
            settings,
            store,
            upstream_mock,
            customer_mock,
        }
    }

    pub async fn seed_client(&self, realm: &str, client_id: &str, client: &ClientData) {
        self.store
            .set(&crate::store::client_key(realm, client_id), client)
            .await
            .expect("Failed to seed client");
    }

    pub async fn seed_user(&self, realm: &str, username: &str, user: &UserData) {
        self.store
            .set(&crate::store::user_key(realm, username), user)
            .await
            .expect("Failed to seed user");
    }

    /// A confidential client with secret "app-secret" owning `uid team.read`.
    pub fn confidential_client() -> ClientData {
        ClientData::default()
            .with_secret_hash(bcrypt::hash("app-secret", 4).unwrap())
            .with_scopes(crate::scopes::split("uid team.read"))
            .confidential(true)
            .with_redirect_uri("https://myapp.example.org/callback")
            .with_name("Test App")
            .with_description("An application for testing")
    }

    /// A user with password "user-pass" owning the `uid` scope.
    pub fn store_user() -> UserData {
        UserData {
            password_hashes: vec![PasswordHash {
                hash: bcrypt::hash("user-pass", 4).unwrap(),
                created: 0,
                created_by: "test".to_string(),
            }],
            scopes: std::collections::HashMap::from([("uid".to_string(), String::new())]),
            ..UserData::default()
        }
    }

    pub fn request_builder(&self, method: Method, uri: impl AsRef<str>) -> http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri.as_ref())
            .header("Host", "localhost")
    }

    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri)
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    /// POST an `application/x-www-form-urlencoded` body, as browsers and
    /// OAuth clients do.
    pub async fn post_form(&self, uri: impl AsRef<str>, fields: &[(&str, &str)]) -> TestResponse {
        self.post_form_with_headers(uri, fields, &[]).await
    }

    pub async fn post_form_with_headers(
        &self,
        uri: impl AsRef<str>,
        fields: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in fields {
            serializer.append_pair(name, value);
        }
        let body = serializer.finish();

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri.as_ref())
            .header("Content-Type", "application/x-www-form-urlencoded");
        // A caller-supplied Host replaces the fixture default
        if !headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("host"))
        {
            builder = builder.header("Host", "localhost");
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Body::from(body))
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn put_json<T: Serialize>(&self, uri: impl AsRef<str>, body: &T) -> TestResponse {
        self.json_request(Method::PUT, uri, body).await
    }

    pub async fn post_json<T: Serialize>(&self, uri: impl AsRef<str>, body: &T) -> TestResponse {
        self.json_request(Method::POST, uri, body).await
    }

    pub async fn delete(&self, uri: impl AsRef<str>) -> TestResponse {
        let request = self
            .request_builder(Method::DELETE, uri)
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    async fn json_request<T: Serialize>(
        &self,
        method: Method,
        uri: impl AsRef<str>,
        body: &T,
    ) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let request = self
            .request_builder(method, uri)
            .header("Content-Type", "application/json")
            .body(Body::from(json_body))
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };
        let text = String::from_utf8_lossy(&body).to_string();

        TestResponse {
            status,
            headers,
            json,
            text,
        }
    }
}

/// Response wrapper with assertion helpers.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
    pub text: String,
}

impl TestResponse {
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status, expected,
            "Expected status {expected}, got {} with body: {}",
            self.status, self.text
        );
        self
    }

    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).expect("Failed to deserialize response")
    }

    /// The Location header of a redirect response.
    pub fn location(&self) -> String {
        self.headers
            .get(http::header::LOCATION)
            .expect("Missing Location header")
            .to_str()
            .expect("Non-UTF8 Location header")
            .to_string()
    }

    /// Query parameters of the Location header, in order of appearance.
    pub fn location_params(&self) -> Vec<(String, String)> {
        let location = self.location();
        let query = location.split_once('?').map(|(_, q)| q).unwrap_or("");
        url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect()
    }

    pub fn location_param(&self, name: &str) -> Option<String> {
        self.location_params()
            .into_iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}
