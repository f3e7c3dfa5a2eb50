//! Registry configuration (`~/.pkgcat/config.toml`).
//!
//! The configuration tells a [`Registry`](crate::registry::Registry) where the
//! content tree lives, which application version to negotiate catalogs
//! against, and how aggressively to refresh and download.
//!
//! # Location
//!
//! - **Unix/macOS**: `~/.pkgcat/config.toml`
//! - **Windows**: `%LOCALAPPDATA%\pkgcat\config.toml`
//! - **Override**: `PKGCAT_CONFIG` environment variable
//!
//! A missing file is not an error; every key has a default.
//!
//! # File Format
//!
//! ```toml
//! install_root = "~/.local/share/pkgcat"
//! application_version = "2024.1.3"
//! locale = "de"
//! max_age_secs = 86400
//! max_concurrent_installs = 2
//! ```

use crate::constants::{
    CONFIG_PATH_ENV, DEFAULT_MAX_AGE_SECS, DEFAULT_MAX_CONCURRENT_INSTALLS,
    DEFAULT_REQUEST_TIMEOUT,
};
use crate::core::{PkgError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

fn default_install_root() -> PathBuf {
    dirs::data_dir().map(|d| d.join("pkgcat")).unwrap_or_else(|| PathBuf::from(".pkgcat"))
}

fn default_application_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

const fn default_max_age_secs() -> u64 {
    DEFAULT_MAX_AGE_SECS
}

const fn default_max_concurrent_installs() -> usize {
    DEFAULT_MAX_CONCURRENT_INSTALLS
}

fn default_user_agent() -> String {
    concat!("pkgcat/", env!("CARGO_PKG_VERSION")).to_string()
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

/// Settings for one [`Registry`](crate::registry::Registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Root of the content tree. Each catalog gets a subdirectory named after its id.
    ///
    /// A leading `~` is expanded when the configuration is loaded.
    #[serde(default = "default_install_root")]
    pub install_root: PathBuf,

    /// Version of the host application, matched against catalog `<version>` entries.
    #[serde(default = "default_application_version")]
    pub application_version: String,

    /// Locale used to pick localized package names and descriptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Freshness window for catalogs that do not declare `max-age-sec`.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Global ceiling on installs downloading at the same time.
    #[serde(default = "default_max_concurrent_installs")]
    pub max_concurrent_installs: usize,

    /// User agent sent by the HTTP transport.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout of the HTTP transport.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            install_root: default_install_root(),
            application_version: default_application_version(),
            locale: None,
            max_age_secs: default_max_age_secs(),
            max_concurrent_installs: default_max_concurrent_installs(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl RegistryConfig {
    /// Configuration rooted at `install_root` for an application at `application_version`.
    ///
    /// Every other key keeps its default.
    pub fn new(install_root: impl Into<PathBuf>, application_version: impl Into<String>) -> Self {
        Self {
            install_root: install_root.into(),
            application_version: application_version.into(),
            ..Self::default()
        }
    }

    /// Load the configuration from the default location.
    ///
    /// Returns the default configuration if the file doesn't exist.
    pub async fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load the configuration from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PkgError::filesystem("read configuration", path, e))?;

        let mut config: Self = toml::from_str(&content).map_err(|e| PkgError::ConfigError {
            message: format!("Failed to parse {}: {e}", path.display()),
        })?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a specific file, creating parent directories.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PkgError::filesystem("create configuration directory", parent, e))?;
        }

        let content = toml::to_string_pretty(self)?;

        fs::write(path, content)
            .await
            .map_err(|e| PkgError::filesystem("write configuration", path, e))?;
        Ok(())
    }

    /// Get the configuration file path.
    ///
    /// `PKGCAT_CONFIG` wins over the platform default.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| PkgError::ConfigError {
                    message: "Unable to determine local data directory".to_string(),
                })?
                .join("pkgcat")
        } else {
            dirs::home_dir()
                .ok_or_else(|| PkgError::ConfigError {
                    message: "Unable to determine home directory".to_string(),
                })?
                .join(".pkgcat")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Reject settings the registry cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.application_version.trim().is_empty() {
            return Err(PkgError::ConfigError {
                message: "application_version must not be empty".to_string(),
            });
        }
        if self.max_concurrent_installs == 0 {
            return Err(PkgError::ConfigError {
                message: "max_concurrent_installs must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Per-request timeout of the HTTP transport.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn expand_paths(&mut self) {
        if let Some(raw) = self.install_root.to_str() {
            let expanded = shellexpand::tilde(raw).into_owned();
            self.install_root = PathBuf::from(expanded);
        }
    }
}
