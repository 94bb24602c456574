use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, Level};

use crate::error::ConfigError;

/// Default config filename, resolved relative to the working directory.
pub const DEFAULT_CONFIG_FILENAME: &str = "cinder.toml";

/// TOML-backed configuration. Every section is optional; a missing file or a
/// missing section falls back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub logging: LoggingConfig,
    pub dispatch: DispatchConfig,
    pub host: HostConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// When false no tracing subscriber is installed at all.
    pub enabled: bool,
    pub level: String,
    pub json: bool,
    /// Append-mode log file. Warnings and errors are echoed to stderr as well.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Isolate subscriber panics so one misbehaving consumer cannot abort a pump.
    pub catch_panics: bool,
    pub call_result_retention: CallResultRetention,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            catch_panics: true,
            call_result_retention: CallResultRetention::default(),
        }
    }
}

/// What happens to a call-result mapping once its result has been delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallResultRetention {
    /// Drop the mapping right after the first delivery (at most once per handle).
    #[default]
    RemoveOnDelivery,
    /// Keep the mapping until the consumer unregisters it explicitly.
    Retain,
}

impl FromStr for CallResultRetention {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remove_on_delivery" => Ok(Self::RemoveOnDelivery),
            "retain" => Ok(Self::Retain),
            other => Err(ConfigError::UnknownRetention(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    pub pump_interval_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            pump_interval_ms: 16,
        }
    }
}

impl HostConfig {
    pub fn pump_interval(&self) -> Duration {
        Duration::from_millis(self.pump_interval_ms)
    }
}

impl Config {
    /// Load `path` (defaults if it does not exist), apply `CINDER_*` environment
    /// overrides (after reading an optional `.env`), then validate.
    pub fn load(path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Apply overrides from a key lookup. `load` passes the process environment;
    /// tests pass a map.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("CINDER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(file) = lookup("CINDER_LOG_FILE") {
            self.logging.file = (!file.is_empty()).then(|| PathBuf::from(file));
        }
        if let Some(json) = lookup("CINDER_LOG_JSON") {
            self.logging.json = parse_bool("CINDER_LOG_JSON", &json)?;
        }
        if let Some(catch) = lookup("CINDER_CATCH_PANICS") {
            self.dispatch.catch_panics = parse_bool("CINDER_CATCH_PANICS", &catch)?;
        }
        if let Some(retention) = lookup("CINDER_CALL_RESULT_RETENTION") {
            self.dispatch.call_result_retention = retention.parse()?;
        }
        if let Some(interval) = lookup("CINDER_PUMP_INTERVAL_MS") {
            self.host.pump_interval_ms =
                interval
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "CINDER_PUMP_INTERVAL_MS",
                        value: interval.clone(),
                    })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if Level::from_str(&self.logging.level).is_err() {
            return Err(ConfigError::UnknownLogLevel(self.logging.level.clone()));
        }
        if self.host.pump_interval_ms == 0 {
            return Err(ConfigError::ZeroPumpInterval);
        }
        Ok(())
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}
