use utoipa::OpenApi;

pub(crate) const OAUTH_TAG: &str = "OAuth2 API";
pub(crate) const DISCOVERY_TAG: &str = "Discovery API";
pub(crate) const ADMIN_TAG: &str = "Administration API";
pub(crate) const HEALTH_TAG: &str = "Health API";

#[derive(OpenApi)]
#[openapi(
    tags(
        (name = OAUTH_TAG, description = "Authorization and token endpoints"),
        (name = DISCOVERY_TAG, description = "OpenID Connect discovery and key endpoints"),
        (name = ADMIN_TAG, description = "Client, user and consent administration"),
        (name = HEALTH_TAG, description = "Health check endpoints"),
    ),
    info(
        title = "Tokensmith API",
        description = "OAuth2/OpenID Connect authorization server",
        version = "1.0.0"
    )
)]
pub(crate) struct ApiDoc;
