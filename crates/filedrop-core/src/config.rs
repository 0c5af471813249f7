//! Configuration management for Filedrop.
//!
//! This module provides the configuration system used by the binary:
//! - Loading from YAML files
//! - Environment variable overrides (`FILEDROP__SECTION__FIELD`)
//! - Validation of all settings

use crate::discovery_config::DiscoveryConfig;
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Main application configuration.
///
/// # Examples
///
/// ```no_run
/// use filedrop_core::config::AppConfig;
///
/// let config = AppConfig::from_file("filedrop.yaml").unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Service discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// HTTP transfer client settings
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Receiver (upload server) settings
    #[serde(default)]
    pub receiver: ReceiverConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::InvalidFormat {
            reason: e.to_string(),
        })
    }

    /// Loads configuration using the `config` crate, layering an optional
    /// file under `FILEDROP__*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or merged.
    pub fn from_config_builder<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut builder = config::Config::builder();
        let mut origin = "environment".to_string();

        if let Some(path) = path {
            let path = path.as_ref();
            origin = path.display().to_string();
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("FILEDROP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: origin,
                reason: e.to_string(),
            })?;

        config
            .try_deserialize()
            .map_err(|e| ConfigError::InvalidFormat {
                reason: e.to_string(),
            })
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.discovery
            .validate()
            .map_err(|reason| ConfigError::invalid("discovery", reason))?;
        self.transfer.validate()?;
        self.receiver.validate()?;
        self.logging.parse_level()?;
        Ok(())
    }
}

/// HTTP transfer client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Timeout for a status probe, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// TCP connect timeout, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Timeout for a whole upload request, in seconds
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_upload_timeout() -> u64 {
    600
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            upload_timeout_secs: default_upload_timeout(),
        }
    }
}

impl TransferConfig {
    /// Returns the request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the connect timeout as a Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns the upload timeout as a Duration
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    /// Validates the transfer configuration.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "transfer.request_timeout_secs",
                "cannot be 0",
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "transfer.connect_timeout_secs",
                "cannot be 0",
            ));
        }
        if self.upload_timeout_secs < self.request_timeout_secs {
            return Err(ConfigError::invalid(
                "transfer.upload_timeout_secs",
                "cannot be shorter than request_timeout_secs",
            ));
        }
        Ok(())
    }
}

/// Receiver (upload server) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Bind address
    #[serde(default = "default_receiver_host")]
    pub host: String,

    /// Listening port
    #[serde(default = "default_receiver_port")]
    pub port: u16,

    /// Directory uploaded files are written to
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Announce the receiver over mDNS
    #[serde(default = "default_announce")]
    pub announce: bool,
}

fn default_receiver_host() -> String {
    "0.0.0.0".to_string()
}

fn default_receiver_port() -> u16 {
    8000
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_upload_bytes() -> u64 {
    100 * 1024 * 1024 // 100MB
}

fn default_announce() -> bool {
    true
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            host: default_receiver_host(),
            port: default_receiver_port(),
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            announce: default_announce(),
        }
    }
}

impl ReceiverConfig {
    /// Returns the `host:port` bind string.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates the receiver configuration.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(ConfigError::invalid("receiver.host", "cannot be empty"));
        }
        if self.upload_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid("receiver.upload_dir", "cannot be empty"));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::invalid(
                "receiver.max_upload_bytes",
                "cannot be 0",
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level
            .parse()
            .map_err(|_| ConfigError::invalid("logging.level", format!("Invalid log level: {}", self.level)))
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}
