#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for berth
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/berth/config.toml)
//! - Environment variables
//! - CLI flags

pub mod constants;

use berth_errors::{ConfigError, Error};
use berth_types::{ColorChoice, OutputFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub account: AccountConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeneralConfig {
    #[serde(default)]
    pub default_output: OutputFormat,
    #[serde(default)]
    pub color: ColorChoice,
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    pub data_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    /// OS-managed directory for large auxiliary assets
    pub asset_dir: Option<PathBuf>,
    pub install_root: Option<PathBuf>,
    pub shortcut_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Address dialed to decide whether the network is reachable
    #[serde(default = "default_probe_address")]
    pub probe_address: String,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_timeout")]
    pub timeout: u64, // seconds
}

/// Install pipeline tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_storage_headroom")]
    pub storage_headroom_bytes: u64,
    #[serde(default = "default_webapp_download_settle")]
    pub webapp_download_settle_ms: u64,
    #[serde(default = "default_webapp_install_settle")]
    pub webapp_install_settle_ms: u64,
    #[serde(default = "default_work_queue_name")]
    pub work_queue_name: String,
}

/// Account/session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default = "default_anonymous")]
    pub anonymous: bool,
    pub name: Option<String>,
}

// Default implementations

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_address: default_probe_address(),
            probe_timeout_ms: default_probe_timeout(),
            timeout: default_timeout(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage_headroom_bytes: default_storage_headroom(),
            webapp_download_settle_ms: default_webapp_download_settle(),
            webapp_install_settle_ms: default_webapp_install_settle(),
            work_queue_name: default_work_queue_name(),
        }
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            anonymous: default_anonymous(),
            name: None,
        }
    }
}

// Default value functions for serde
fn default_probe_address() -> String {
    constants::DEFAULT_PROBE_ADDRESS.to_string()
}

fn default_probe_timeout() -> u64 {
    2_000
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_storage_headroom() -> u64 {
    constants::DEFAULT_STORAGE_HEADROOM_BYTES
}

fn default_webapp_download_settle() -> u64 {
    constants::DEFAULT_WEBAPP_DOWNLOAD_SETTLE_MS
}

fn default_webapp_install_settle() -> u64 {
    constants::DEFAULT_WEBAPP_INSTALL_SETTLE_MS
}

fn default_work_queue_name() -> String {
    constants::DEFAULT_WORK_QUEUE_NAME.to_string()
}

fn default_anonymous() -> bool {
    true
}

impl PipelineConfig {
    #[must_use]
    pub fn webapp_download_settle(&self) -> Duration {
        Duration::from_millis(self.webapp_download_settle_ms)
    }

    #[must_use]
    pub fn webapp_install_settle(&self) -> Duration {
        Duration::from_millis(self.webapp_install_settle_ms)
    }
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir
            .join(constants::APP_DIR_NAME)
            .join(constants::CONFIG_FILE_NAME))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // BERTH_OUTPUT
        if let Ok(output) = std::env::var("BERTH_OUTPUT") {
            self.general.default_output = match output.as_str() {
                "plain" => OutputFormat::Plain,
                "tty" => OutputFormat::Tty,
                "json" => OutputFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "BERTH_OUTPUT".to_string(),
                        value: output,
                    }
                    .into())
                }
            };
        }

        // BERTH_COLOR
        if let Ok(color) = std::env::var("BERTH_COLOR") {
            self.general.color = match color.as_str() {
                "always" => ColorChoice::Always,
                "auto" => ColorChoice::Auto,
                "never" => ColorChoice::Never,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "BERTH_COLOR".to_string(),
                        value: color,
                    }
                    .into())
                }
            };
        }

        // BERTH_DATA_DIR
        if let Ok(dir) = std::env::var("BERTH_DATA_DIR") {
            self.paths.data_dir = Some(PathBuf::from(dir));
        }

        // BERTH_STORAGE_HEADROOM
        if let Ok(headroom) = std::env::var("BERTH_STORAGE_HEADROOM") {
            self.pipeline.storage_headroom_bytes =
                headroom.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "BERTH_STORAGE_HEADROOM".to_string(),
                    value: headroom,
                })?;
        }

        // BERTH_ANONYMOUS
        if let Ok(anonymous) = std::env::var("BERTH_ANONYMOUS") {
            self.account.anonymous = match anonymous.as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "BERTH_ANONYMOUS".to_string(),
                        value: anonymous,
                    }
                    .into())
                }
            };
        }

        Ok(())
    }

    /// Get the data directory (with default)
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(constants::APP_DIR_NAME)
        })
    }

    /// Get the database path
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join(constants::DB_FILE_NAME)
    }

    /// Get the artifact cache root (with default)
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.paths
            .cache_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join(constants::CACHE_DIR_NAME))
    }

    /// Get the auxiliary asset root (with default)
    #[must_use]
    pub fn asset_dir(&self) -> PathBuf {
        self.paths
            .asset_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join(constants::ASSET_DIR_NAME))
    }

    /// Get the install root (with default)
    #[must_use]
    pub fn install_root(&self) -> PathBuf {
        self.paths
            .install_root
            .clone()
            .unwrap_or_else(|| self.data_dir().join(constants::INSTALL_DIR_NAME))
    }

    /// Get the shortcut directory (with default)
    #[must_use]
    pub fn shortcut_dir(&self) -> PathBuf {
        self.paths
            .shortcut_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join(constants::SHORTCUT_DIR_NAME))
    }

    /// Get the log directory (with default)
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.paths
            .log_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join(constants::LOGS_DIR_NAME))
    }
}
