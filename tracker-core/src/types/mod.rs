//! Core domain types for the tracker.

pub mod bucket;
pub mod metric;

// Re-exports
pub use bucket::{truncate_to_hour, HourBucket, MetricPoint, TimeRange, BUCKET_SECS};
pub use metric::{Granularity, MetricType, PermissionState};
