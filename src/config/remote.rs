use serde::Deserialize;

/// Upstream-OAuth-delegate realm: where to send the user's credentials and
/// where to resolve the resulting token into a user id.
#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub token_url: String,
    #[serde(default)]
    pub token_info_url: String,
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            token_url: String::new(),
            token_info_url: String::new(),
            timeout_secs: default_remote_timeout_secs(),
        }
    }
}

/// Legacy customer-directory realm.
#[derive(Debug, Deserialize, Clone)]
pub struct CustomerConfig {
    #[serde(default)]
    pub service_url: String,
    /// Application domain passed along with every login call.
    #[serde(default = "default_app_domain_id")]
    pub app_domain_id: u32,
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CustomerConfig {
    fn default() -> Self {
        Self {
            service_url: String::new(),
            app_domain_id: default_app_domain_id(),
            timeout_secs: default_remote_timeout_secs(),
        }
    }
}

fn default_remote_timeout_secs() -> u64 {
    5
}

fn default_app_domain_id() -> u32 {
    1
}
