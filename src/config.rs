/// Service configuration loader - parses hydroviewer.toml
///
/// Keeps archive locations, API credentials and server settings out of the
/// code. The loaded `AppConfig` is immutable and injected into the locator,
/// the extractor and the endpoint; nothing reads settings ad hoc.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::model::ModelFamily;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "hydroviewer.toml";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub archives: ArchiveConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub app: AppSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            workers: default_workers(),
        }
    }
}

/// How archive epoch seconds become wall-clock timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveTimezone {
    /// Server-local time, as the LIS/HIWAT charts have always shown.
    #[default]
    Local,
    Utc,
}

/// Local Qout archive roots. Unset roots make that family unavailable.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ArchiveConfig {
    pub lis_path: Option<PathBuf>,
    pub hiwat_path: Option<PathBuf>,
    #[serde(default)]
    pub timezone: ArchiveTimezone,
}

impl ArchiveConfig {
    /// Archive root for a family; `None` for remote families or unset roots.
    pub fn root_for(&self, family: ModelFamily) -> Option<&Path> {
        let root = match family {
            ModelFamily::Ecmwf => None,
            ModelFamily::Lis => self.lis_path.as_deref(),
            ModelFamily::Hiwat => self.hiwat_path.as_deref(),
        };
        root.filter(|p| !p.as_os_str().is_empty())
    }

    /// Archive families with a root set, in `ModelFamily::ALL` order.
    pub fn configured_families(&self) -> Vec<ModelFamily> {
        ModelFamily::ALL
            .into_iter()
            .filter(|&family| self.root_for(family).is_some())
            .collect()
    }
}

/// Streamflow prediction tool API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            token: String::new(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            accept_invalid_certs: false,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Front-end settings the service reports but does not act on.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSettings {
    #[serde(default)]
    pub keywords: String,
    pub default_model: Option<String>,
    pub default_watershed: Option<String>,
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retries() -> u32 {
    1
}

impl AppConfig {
    /// Parses configuration from TOML text.
    pub fn from_toml_str(contents: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    /// Reads and parses a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let origin = path.display().to_string();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: origin.clone(),
            source,
        })?;
        Self::from_toml_str(&contents, &origin)
    }

    /// Loads `.env`, reads the configuration file and applies environment
    /// overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies overrides from `lookup` (the process environment in
    /// production). Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get("HYDROVIEWER_LIS_PATH") {
            self.archives.lis_path = Some(PathBuf::from(path));
        }
        if let Some(path) = get("HYDROVIEWER_HIWAT_PATH") {
            self.archives.hiwat_path = Some(PathBuf::from(path));
        }
        if let Some(source) = get("SPT_API_SOURCE") {
            self.api.source = source;
        }
        if let Some(token) = get("SPT_TOKEN") {
            self.api.token = token;
        }
        if let Some(port) = get("HYDROVIEWER_PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "HYDROVIEWER_PORT".to_string(),
                value: port.clone(),
            })?;
        }
        Ok(())
    }

    /// API base URL without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.api.source.trim_end_matches('/')
    }
}
