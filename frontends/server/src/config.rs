use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use axum::http::{HeaderName, HeaderValue, Method, header};
use morph::compiler::Pagination;
use morph::crud::AdminGuard;
use morph::{
    CrudConfig, FileDirtySignal, JsonFileDefinitionStore, Platform, RoleTable,
};
use morph_api::CrudAction;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "MORPH_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "morph.yaml";
pub const ROLE_HEADER: &str = "x-morph-role";

/// Server configuration, read from YAML. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Directory of the JSON definition store; in-memory when unset
    pub catalog_dir: Option<PathBuf>,
    /// Marker file shared with other processes that edit the catalog
    pub dirty_marker: Option<PathBuf>,
    /// Role assumed when a request carries no role header
    pub default_role: String,
    /// Role allowed to administer schemas
    pub admin_role: String,
    /// Role -> permitted CRUD actions. Empty means: the admin role may do
    /// everything, the default role may read.
    pub roles: HashMap<String, Vec<CrudAction>>,
    pub admin_guard: Option<AdminGuard>,
    pub pagination: Pagination,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            catalog_dir: None,
            dirty_marker: None,
            default_role: "guest".to_string(),
            admin_role: "admin".to_string(),
            roles: HashMap::new(),
            admin_guard: Some(AdminGuard::default()),
            pagination: Pagination::default(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e)
        })?;
        Self::from_yaml(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config YAML {}: {}", path.display(), e))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut config: Self = serde_yaml::from_str(content)?;
        let pagination = config.pagination.normalized();
        if pagination != config.pagination {
            warn!(
                "[ServerConfig] Pagination {:?} adjusted to {:?}",
                config.pagination, pagination
            );
            config.pagination = pagination;
        }
        Ok(config)
    }

    /// First CLI argument, then `MORPH_CONFIG`, then `./morph.yaml` if it
    /// exists. Defaults otherwise.
    pub fn discover(arg: Option<String>) -> Result<Self> {
        let explicit = arg
            .or_else(|| std::env::var(CONFIG_ENV).ok())
            .map(PathBuf::from);
        match explicit {
            Some(path) => {
                info!("[ServerConfig] Loading {}", path.display());
                Self::load_from_file(&path)
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                info!("[ServerConfig] Loading {}", DEFAULT_CONFIG_FILE);
                Self::load_from_file(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => {
                info!("[ServerConfig] No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn role_table(&self) -> RoleTable {
        if self.roles.is_empty() {
            return RoleTable::new()
                .allow(self.admin_role.clone(), CrudAction::ALL)
                .allow(self.default_role.clone(), [CrudAction::Read]);
        }
        self.roles
            .iter()
            .fold(RoleTable::new(), |table, (role, actions)| {
                table.allow(role.clone(), actions.iter().copied())
            })
    }

    pub fn crud_config(&self) -> CrudConfig {
        CrudConfig {
            pagination: Some(self.pagination),
            admin_guard: self.admin_guard.clone(),
        }
    }

    /// Wire the engine with the configured stores and access gate.
    pub async fn build_platform(&self) -> Result<Platform> {
        let mut builder = Platform::builder()
            .gate(Arc::new(self.role_table()))
            .config(self.crud_config());
        if let Some(dir) = &self.catalog_dir {
            let store = JsonFileDefinitionStore::open(dir.clone()).await?;
            info!("[ServerConfig] Definitions stored in {}", dir.display());
            builder = builder.definitions(Arc::new(store));
        }
        if let Some(marker) = &self.dirty_marker {
            builder = builder.dirty_signal(Arc::new(FileDirtySignal::new(marker.clone())));
        }
        Ok(builder.build())
    }

    pub fn cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .cors_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("[ServerConfig] Ignoring CORS origin '{}': {}", origin, e);
                    None
                }
            })
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(ROLE_HEADER)])
    }
}
