//! Bundle client configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Base URL of the platform API gateway.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Organization sent with every request.
    #[serde(default)]
    pub org_id: Option<u64>,
    /// Identity used when a call is not made on behalf of a specific user.
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:9529".to_string()
}

fn default_user_id() -> String {
    "tollgate".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            org_id: None,
            user_id: default_user_id(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BundleConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_org_id(mut self, org_id: u64) -> Self {
        self.org_id = Some(org_id);
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}
