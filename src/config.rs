//! Configuration types.
//!
//! `PoolConfig` is the validated, in-memory form. Files and the environment
//! express durations as fractional seconds and are converted on load, so a
//! negative or non-finite value is reported instead of silently clamped.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Number of concurrent workers. Must be greater than zero.
    pub num_workers: usize,
    /// Total attempts per task (`0` and `1` both mean a single attempt).
    pub max_retries: u32,
    /// Delay between attempts of the same task.
    pub retry_delay: Duration,
    /// Polling interval for the progress monitor. Must be greater than zero.
    pub monitor_interval: Duration,
    /// Enable detailed logging in the bundled runner.
    pub verbose: bool,
    /// Free-form settings handed to the task processor.
    pub processor: serde_json::Value,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            monitor_interval: Duration::from_secs(1),
            verbose: false,
            processor: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

impl PoolConfig {
    /// Check the invariants that the type system does not enforce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::invalid(
                "num_workers",
                "must be greater than 0, got: 0",
            ));
        }
        if self.monitor_interval.is_zero() {
            return Err(ConfigError::invalid(
                "monitor_interval",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        raw.try_into()
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        raw.try_into()
    }

    /// Load a configuration file, picking the format from its extension.
    ///
    /// `.json`, `.yaml` and `.yml` are supported.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_file(path),
            Some("yaml" | "yml") => Self::from_yaml_file(path),
            other => Err(ConfigError::UnsupportedFormat(
                other.map(|ext| format!(".{ext}")).unwrap_or_default(),
            )),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(&RawConfig::from(self))
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&RawConfig::from(self))
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Write the configuration as JSON.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Write the configuration as YAML.
    pub fn save_yaml(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_yaml_string()?)?;
        Ok(())
    }

    /// Build config from environment variables, falling back to defaults
    /// for unset keys. A set but unparsable value is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut raw = RawConfig::from(&defaults);

        if let Some(workers) = env_var("BOT_POOL_WORKERS")? {
            raw.num_workers = workers;
        }
        if let Some(retries) = env_var("BOT_POOL_MAX_RETRIES")? {
            raw.max_retries = retries;
        }
        if let Some(delay) = env_var("BOT_POOL_RETRY_DELAY_SECS")? {
            raw.retry_delay_secs = delay;
        }
        if let Some(interval) = env_var("BOT_POOL_MONITOR_INTERVAL_SECS")? {
            raw.monitor_interval_secs = interval;
        }
        if let Some(verbose) = env_var("BOT_POOL_VERBOSE")? {
            raw.verbose = verbose;
        }

        raw.try_into()
    }
}

/// Batch conductor configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    /// Maximum number of batches processed at the same time.
    pub max_workers: usize,
    /// Maximum number of items per batch.
    pub batch_size: usize,
    /// Total attempts per item inside a batch.
    pub max_retries: u32,
    /// Delay between attempts of the same item.
    pub retry_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            batch_size: 30,
            max_retries: 1,
            retry_delay: Duration::ZERO,
        }
    }
}

impl BatchConfig {
    /// Check that both limits are non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::invalid(
                "max_workers",
                "must be greater than 0, got: 0",
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid(
                "batch_size",
                "must be greater than 0, got: 0",
            ));
        }
        Ok(())
    }
}

fn env_var<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::invalid(key, format!("{value:?}: {e}"))),
        Err(_) => Ok(None),
    }
}

// ── On-disk representation ──────────────────────────────────────────

/// Serialized form of [`PoolConfig`]. Signed and floating-point fields so
/// that bad values reach validation with a useful message.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct RawConfig {
    #[serde(alias = "num_bots")]
    num_workers: i64,
    max_retries: i64,
    #[serde(alias = "retry_delay")]
    retry_delay_secs: f64,
    #[serde(alias = "monitor_interval")]
    monitor_interval_secs: f64,
    verbose: bool,
    #[serde(alias = "task_processor_config")]
    processor: serde_json::Value,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self::from(&PoolConfig::default())
    }
}

impl From<&PoolConfig> for RawConfig {
    fn from(config: &PoolConfig) -> Self {
        Self {
            num_workers: config.num_workers as i64,
            max_retries: i64::from(config.max_retries),
            retry_delay_secs: config.retry_delay.as_secs_f64(),
            monitor_interval_secs: config.monitor_interval.as_secs_f64(),
            verbose: config.verbose,
            processor: config.processor.clone(),
        }
    }
}

impl TryFrom<RawConfig> for PoolConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let num_workers = usize::try_from(raw.num_workers)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::invalid(
                    "num_workers",
                    format!("must be greater than 0, got: {}", raw.num_workers),
                )
            })?;

        let max_retries = u32::try_from(raw.max_retries).map_err(|_| {
            ConfigError::invalid(
                "max_retries",
                format!("must be non-negative, got: {}", raw.max_retries),
            )
        })?;

        let retry_delay = seconds("retry_delay", raw.retry_delay_secs)?;
        let monitor_interval = seconds("monitor_interval", raw.monitor_interval_secs)?;

        let processor = match raw.processor {
            serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
            other => other,
        };

        let config = PoolConfig {
            num_workers,
            max_retries,
            retry_delay,
            monitor_interval,
            verbose: raw.verbose,
            processor,
        };
        config.validate()?;
        Ok(config)
    }
}

fn seconds(key: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        ConfigError::invalid(
            key,
            format!("must be a non-negative number of seconds, got: {secs}"),
        )
    })
}
