//! Centralized path configuration for the tracker.
//!
//! All data paths should go through this module so every collector module
//! in a process resolves the same database and config files.

use std::path::PathBuf;

/// Get the tracker data directory.
///
/// Resolution order:
/// 1. `TRACKER_DATA_DIR` environment variable
/// 2. The platform data directory (e.g. `~/.local/share/tracker`)
/// 3. `~/.tracker`
/// 4. `./.tracker` when no home directory is known
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TRACKER_DATA_DIR") {
        return PathBuf::from(dir);
    }

    dirs::data_dir()
        .map(|d| d.join("tracker"))
        .or_else(|| dirs::home_dir().map(|h| h.join(".tracker")))
        .unwrap_or_else(|| PathBuf::from(".tracker"))
}

/// Get the tracker config directory.
///
/// `TRACKER_CONFIG_DIR` wins over the platform config directory.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TRACKER_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    dirs::config_dir().map(|d| d.join("tracker")).unwrap_or_else(data_dir)
}

/// Default database file name.
pub const DEFAULT_DB_FILE: &str = "tracker.db";

/// Get the default database path.
pub fn db_path() -> PathBuf {
    data_dir().join(DEFAULT_DB_FILE)
}
