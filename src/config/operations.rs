//! Config loading, validation, and duration accessors.

use super::model::Config;
use crate::error::{LockError, Result};
use std::path::Path;
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            LockError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load config if the file exists, otherwise fall back to defaults.
    ///
    /// A present but malformed file is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // serde_yaml refuses an empty document; treat it as "all defaults".
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| LockError::UserError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| LockError::UserError(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Every size and duration must be positive.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("max_batch_size", self.max_batch_size as u64),
            ("default_lease_seconds", self.default_lease_seconds),
            ("call_timeout_ms", self.call_timeout_ms),
            ("mutex_retry_ms", self.mutex_retry_ms),
            ("mutex_stale_seconds", self.mutex_stale_seconds),
        ];

        for (field, value) in checks {
            if value == 0 {
                return Err(LockError::UserError(format!(
                    "config validation failed: {} must be greater than 0",
                    field
                )));
            }
        }

        if self.refresh_lease_seconds == Some(0) {
            return Err(LockError::UserError(
                "config validation failed: refresh_lease_seconds must be greater than 0 when set"
                    .to_string(),
            ));
        }

        Ok(())
    }

    pub fn default_lease(&self) -> Duration {
        Duration::from_secs(self.default_lease_seconds)
    }

    pub fn refresh_lease(&self) -> Option<Duration> {
        self.refresh_lease_seconds.map(Duration::from_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn mutex_retry_interval(&self) -> Duration {
        Duration::from_millis(self.mutex_retry_ms)
    }

    pub fn mutex_stale_after(&self) -> Duration {
        Duration::from_secs(self.mutex_stale_seconds)
    }
}
