//! Error types for the tracker.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use crate::types::MetricType;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Main error type for the tracker.
#[derive(Error, Debug)]
pub enum TrackerError {
    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Database migration failed: {reason}")]
    MigrationFailed { reason: String },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // File system errors
    #[error("I/O error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Failure raised by a host-provided collector.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure of a single sync pass.
///
/// Any variant aborts the pass without advancing the cursor. The scheduling
/// boundary maps every variant to "retry".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Health data source is unavailable")]
    SourceUnavailable,

    #[error("Fetch from health data source failed: {0}")]
    FetchFailed(String),

    #[error("Failed to persist sync state: {0}")]
    StoreFailed(String),
}

impl From<SourceError> for SyncError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unavailable => SyncError::SourceUnavailable,
            SourceError::Request(reason) => SyncError::FetchFailed(reason),
        }
    }
}

impl From<TrackerError> for SyncError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::Sync(inner) => inner,
            other => SyncError::StoreFailed(other.to_string()),
        }
    }
}

/// Errors surfaced by the collector registry.
///
/// These are programming errors (missing module, wrong capability) and are
/// never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error(
        "Collector for {0} is not registered. Make sure the corresponding module is wired into the host"
    )]
    NotRegistered(MetricType),

    #[error("Collector for {metric} does not support {operation} with granularity")]
    UnsupportedCapability { metric: MetricType, operation: &'static str },
}

/// Errors reported by a platform health data source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The platform capability is absent or currently unreachable.
    #[error("source unavailable")]
    Unavailable,

    #[error("source request failed: {0}")]
    Request(String),
}
