use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::{DEFAULT_LOGIN_PATH, DEFAULT_REFRESH_PATH};
use crate::error::{AppError, ConfigError};
use crate::store::{FileTokenStore, MemoryTokenStore, TokenStore};

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub api: ApiSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub application: ApplicationSettings,
    #[serde(default)]
    pub credentials: Option<CredentialSettings>,
}

/// Where the portal backend lives
#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApiSettings {
    pub base_url: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    /// Per-request timeout; the HTTP client default applies when unset
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(serde::Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
}

#[derive(serde::Deserialize, Clone, Debug, Default)]
pub struct SessionSettings {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Session file, required for the `file` backend
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl SessionSettings {
    pub fn build_store(&self) -> Result<Arc<dyn TokenStore>, AppError> {
        match self.backend {
            StoreBackend::Memory => Ok(Arc::new(MemoryTokenStore::new())),
            StoreBackend::File => {
                let path = self.path.clone().ok_or_else(|| {
                    ConfigError::MissingRequired("session.path for the file backend".to_string())
                })?;
                Ok(Arc::new(FileTokenStore::new(path)))
            }
        }
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    /// Protected resource fetched by the binary
    #[serde(default = "default_resource_path")]
    pub resource_path: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            resource_path: default_resource_path(),
        }
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct CredentialSettings {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for CredentialSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSettings")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn default_login_path() -> String {
    DEFAULT_LOGIN_PATH.to_string()
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

fn default_resource_path() -> String {
    "/api/users/me".to_string()
}

/// Load `configuration.{yaml,toml,json}` if present, then apply
/// `NEWSPORTAL__SECTION__KEY` environment overrides.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(config::Environment::with_prefix("NEWSPORTAL").separator("__"))
        .build()?;
    settings.try_deserialize::<Settings>()
}
