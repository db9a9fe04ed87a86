use std::sync::Arc;

use axum::http::HeaderMap;
use morph::Platform;

use crate::config::{ROLE_HEADER, ServerConfig};

#[derive(Clone)]
pub struct AppState {
    pub platform: Arc<Platform>,
    pub default_role: String,
    pub admin_role: String,
}

impl AppState {
    pub fn new(platform: Platform, config: &ServerConfig) -> Self {
        Self {
            platform: Arc::new(platform),
            default_role: config.default_role.clone(),
            admin_role: config.admin_role.clone(),
        }
    }

    /// Caller role from the role header, else the configured default.
    pub fn role(&self, headers: &HeaderMap) -> String {
        headers
            .get(ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .unwrap_or(self.default_role.as_str())
            .to_string()
    }
}
