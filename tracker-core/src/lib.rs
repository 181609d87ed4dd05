//! Tracker Core Library
//!
//! Incremental synchronization of health metrics from a platform data source
//! into a local hour-bucket cache, with hourly/daily reads and a registry for
//! looking collectors up by metric type.

pub mod aggregate;
pub mod cache;
pub mod clock;
pub mod collector;
pub mod config;
pub mod error;
pub mod manager;
pub mod observability;
pub mod paths;
pub mod registry;
pub mod scheduler;
pub mod source;
pub mod state;
pub mod sync;
pub mod types;

// Re-export commonly used items
pub use cache::{BucketCache, BucketSubscription};
pub use clock::{Clock, FixedClock, SystemClock};
pub use collector::{CollectorCapabilities, DataCollector, GranularDataCollector, MetricSubscription};
pub use config::TrackerConfig;
pub use error::{RegistryError, Result, SourceError, SyncError, TrackerError};
pub use manager::HealthDataManager;
pub use observability::{
    init as init_observability, init_from_config as init_observability_from_config,
};
pub use registry::CollectorRegistry;
pub use scheduler::{spawn_periodic, SyncWorker, WorkOutcome};
pub use source::{ChangeEvent, ChangesPage, HealthSource, SourceBucket, SourceResult};
pub use state::{CursorStore, StateManager};
pub use sync::{SyncEngine, SyncResult, SyncSettings};
pub use types::{Granularity, HourBucket, MetricPoint, MetricType, PermissionState, TimeRange};
