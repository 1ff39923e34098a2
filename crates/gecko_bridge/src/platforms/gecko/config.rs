use std::time::Duration;

use tracing::warn;

use super::PLATFORM_NAME;
use crate::config::PlatformConfig;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8088";
pub const DEFAULT_POLLING_INTERVAL_SEC: f64 = 5.0;

/// Bounds applied to `pollingIntervalSec` (one second to one day)
pub const MIN_POLLING_INTERVAL_SEC: f64 = 1.0;
pub const MAX_POLLING_INTERVAL_SEC: f64 = 86_400.0;

/// Which optional sub-features of the spa are exposed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessoriesConfig {
    pub thermostat: bool,
    pub pump1: bool,
    pub light: bool,
}

impl Default for AccessoriesConfig {
    fn default() -> Self {
        Self {
            thermostat: true,
            pump1: true,
            light: true,
        }
    }
}

/// Effective configuration of the GeckoInTouch2 platform
///
/// Every field has a value: anything missing or unusable in the platform
/// section is replaced by its default.
#[derive(Debug, Clone, PartialEq)]
pub struct GeckoConfig {
    /// Address of the spa's local HTTP API
    pub base_url: String,

    /// Seconds between two status polls
    pub polling_interval_sec: f64,

    pub accessories: AccessoriesConfig,
}

impl Default for GeckoConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            polling_interval_sec: DEFAULT_POLLING_INTERVAL_SEC,
            accessories: AccessoriesConfig::default(),
        }
    }
}

impl GeckoConfig {
    /// Resolve the effective configuration from a `[[platforms]]` entry.
    ///
    /// Never fails; bad values are logged and defaulted.
    pub fn from_platform_config(cfg: &PlatformConfig) -> Self {
        Self {
            base_url: base_url(cfg.get("baseUrl")),
            polling_interval_sec: polling_interval_sec(cfg.get("pollingIntervalSec")),
            accessories: accessories(cfg.get("accessories")),
        }
    }

    /// Timer period for polling, always within the accepted bounds
    pub fn polling_interval(&self) -> Duration {
        let secs = self
            .polling_interval_sec
            .clamp(MIN_POLLING_INTERVAL_SEC, MAX_POLLING_INTERVAL_SEC);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(Duration::from_secs_f64(DEFAULT_POLLING_INTERVAL_SEC))
    }
}

fn base_url(value: Option<&toml::Value>) -> String {
    match value {
        Some(toml::Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        None | Some(toml::Value::String(_)) => DEFAULT_BASE_URL.to_string(),
        Some(other) => {
            warn!(
                "[{}] baseUrl must be a string, got {}; using {}",
                PLATFORM_NAME,
                other.type_str(),
                DEFAULT_BASE_URL
            );
            DEFAULT_BASE_URL.to_string()
        }
    }
}

/// Numbers and numeric strings are both accepted
fn polling_interval_sec(value: Option<&toml::Value>) -> f64 {
    let parsed = match value {
        None => return DEFAULT_POLLING_INTERVAL_SEC,
        Some(toml::Value::Integer(i)) => Some(*i as f64),
        Some(toml::Value::Float(f)) => Some(*f),
        Some(toml::Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(secs) if secs.is_finite() && secs > 0.0 => {
            let clamped = secs.clamp(MIN_POLLING_INTERVAL_SEC, MAX_POLLING_INTERVAL_SEC);
            if clamped != secs {
                warn!(
                    "[{}] pollingIntervalSec {} is out of range; using {}",
                    PLATFORM_NAME, secs, clamped
                );
            }
            clamped
        }
        _ => {
            warn!(
                "[{}] pollingIntervalSec must be a positive number, got {}; using {}",
                PLATFORM_NAME,
                value.map(|v| v.to_string()).unwrap_or_default(),
                DEFAULT_POLLING_INTERVAL_SEC
            );
            DEFAULT_POLLING_INTERVAL_SEC
        }
    }
}

fn accessories(value: Option<&toml::Value>) -> AccessoriesConfig {
    let table = match value {
        None => return AccessoriesConfig::default(),
        Some(toml::Value::Table(t)) => t,
        Some(other) => {
            warn!(
                "[{}] accessories must be a table, got {}; enabling everything",
                PLATFORM_NAME,
                other.type_str()
            );
            return AccessoriesConfig::default();
        }
    };

    AccessoriesConfig {
        thermostat: flag(table, "thermostat"),
        pump1: flag(table, "pump1"),
        light: flag(table, "light"),
    }
}

fn flag(table: &toml::Table, key: &str) -> bool {
    match table.get(key) {
        None => true,
        Some(toml::Value::Boolean(b)) => *b,
        Some(other) => {
            warn!(
                "[{}] accessories.{} must be a boolean, got {}; enabling it",
                PLATFORM_NAME,
                key,
                other.type_str()
            );
            true
        }
    }
}
