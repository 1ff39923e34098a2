//! Configuration file parsing and structures.
//!
//! The bridge reads a single TOML file with two kinds of sections:
//! - Bridge sections: statically typed Rust structs (bridge, logging, api)
//! - Platform sections: opaque tables, interpreted by the platform plugin that
//!   claims them via its `platform` name

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: Option<ApiConfig>,
    #[serde(default)]
    pub platforms: Vec<PlatformConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target overrides, e.g. `"gecko_bridge::host" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the subscriber filter: `level` by default, overridden per target
    pub fn targets(&self) -> Targets {
        self.overrides.iter().fold(
            Targets::new().with_default(LevelFilter::from(self.level)),
            |targets, (target, level)| {
                targets.with_target(target.clone(), LevelFilter::from(*level))
            },
        )
    }
}

fn default_bridge_name() -> String {
    "Gecko Bridge".to_string()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./persist")
}

/// Bridge-wide configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Name the bridge announces itself with
    #[serde(default = "default_bridge_name")]
    pub name: String,

    /// Directory holding persistent state (the accessory cache)
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: default_bridge_name(),
            storage_path: default_storage_path(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8581
}

/// Status HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// A single `[[platforms]]` entry
///
/// Everything besides `platform` and `name` is intentionally opaque and is
/// validated by the plugin that registered the platform name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformConfig {
    /// Registered platform name (e.g., "GeckoInTouch2")
    pub platform: String,

    /// Optional user-facing name for this platform instance
    #[serde(default)]
    pub name: Option<String>,

    /// Platform-specific settings
    #[serde(flatten)]
    pub settings: toml::Table,
}

impl PlatformConfig {
    /// Look up a platform-specific setting by key
    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.settings.get(key)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}
