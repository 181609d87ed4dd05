//! Configuration management.

use crate::error::{Result, TrackerError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest lookback or retention horizon accepted, in days.
pub const MAX_HORIZON_DAYS: u32 = 3660;

/// Persistent configuration for the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub data_dir: String,
    pub db_file: String,
    /// Days fetched by an initial sync.
    pub lookback_days: u32,
    /// Days of buckets kept after an incremental sync.
    pub retention_days: u32,
    /// Period for the built-in periodic driver.
    pub sync_interval_secs: u64,
    /// Default tracing filter, applied by [`crate::observability::init_from_config`]
    /// when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_dir: paths::data_dir().to_string_lossy().to_string(),
            db_file: paths::DEFAULT_DB_FILE.to_string(),
            lookback_days: 30,
            retention_days: 366,
            sync_interval_secs: 15 * 60,
            log_level: "info".to_string(),
        }
    }
}

impl TrackerConfig {
    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        paths::config_dir().join("config.json")
    }

    /// Full path of the state database.
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.db_file)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Load configuration from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| TrackerError::InvalidConfig {
            reason: format!("Failed to read config: {}", e),
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            TrackerError::InvalidConfig { reason: format!("Failed to parse config: {}", e) }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TrackerError::IoError { path: parent.to_path_buf(), source: e })?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            TrackerError::InvalidConfig { reason: format!("Failed to serialize config: {}", e) }
        })?;
        std::fs::write(path, content)
            .map_err(|e| TrackerError::IoError { path: path.to_path_buf(), source: e })
    }

    /// Reject values the sync engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.lookback_days == 0 {
            return Err(TrackerError::InvalidConfig {
                reason: "lookback_days must be at least 1".to_string(),
            });
        }
        let horizons = [("lookback_days", self.lookback_days), ("retention_days", self.retention_days)];
        for (name, days) in horizons {
            if days > MAX_HORIZON_DAYS {
                return Err(TrackerError::InvalidConfig {
                    reason: format!("{} ({}) must not exceed {}", name, days, MAX_HORIZON_DAYS),
                });
            }
        }
        if self.retention_days < self.lookback_days {
            return Err(TrackerError::InvalidConfig {
                reason: format!(
                    "retention_days ({}) must not be shorter than lookback_days ({})",
                    self.retention_days, self.lookback_days
                ),
            });
        }
        if self.sync_interval_secs == 0 {
            return Err(TrackerError::InvalidConfig {
                reason: "sync_interval_secs must be positive".to_string(),
            });
        }
        Ok(())
    }
}
