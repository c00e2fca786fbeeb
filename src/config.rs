//! Application configuration.
//!
//! Loaded from built-in defaults, an optional TOML file and `ERRORGATE__*`
//! environment variables, in increasing order of precedence.

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::policy::{LogOptions, RuntimeEnvironment};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "ERRORGATE";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// The configuration file path is not valid UTF-8.
    #[error("invalid configuration path: {0}")]
    InvalidPath(String),

    /// A source could not be read or the result did not deserialize.
    #[error("failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(crate::sink::file::DEFAULT_LOG_DIR)
}

fn default_grace_secs() -> u64 {
    crate::lifecycle::DEFAULT_GRACE_PERIOD.as_secs()
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    /// Runtime mode; production unless configured otherwise.
    #[serde(default)]
    pub environment: RuntimeEnvironment,
    /// Log channels for operational errors.
    #[serde(default)]
    pub log: LogOptions,
    /// Directory for error log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Grace period before a forced exit, in seconds.
    #[serde(default = "default_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: RuntimeEnvironment::default(),
            log: LogOptions::default(),
            log_dir: default_log_dir(),
            shutdown_grace_secs: default_grace_secs(),
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration, reading `path` when given.
    ///
    /// Environment variables use the `ERRORGATE` prefix and `__` as the
    /// nesting separator, e.g. `ERRORGATE__ENVIRONMENT=development` or
    /// `ERRORGATE__LOG__LOG_TO_FILE=false`.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` does not exist or a source fails to parse.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            let path_str = path
                .to_str()
                .ok_or_else(|| ConfigError::InvalidPath(format!("{:?}", path)))?;
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path_str.to_string()));
            }
            builder = builder.add_source(File::new(path_str, FileFormat::Toml));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parses configuration from a TOML string, without environment overrides.
    pub fn from_toml_str(toml: &str) -> ConfigResult<Self> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Applies command-line overrides, which take precedence over every
    /// other source.
    pub fn with_overrides(
        mut self,
        environment: Option<RuntimeEnvironment>,
        port: Option<u16>,
    ) -> Self {
        if let Some(environment) = environment {
            self.environment = environment;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
        self
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// The listener address as `ip:port`.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}
