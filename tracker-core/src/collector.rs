//! Collector abstraction.
//!
//! Every metric module exposes a [`DataCollector`]. Modules that can serve
//! range reads at a chosen granularity also implement
//! [`GranularDataCollector`] and return themselves from
//! [`DataCollector::as_granular`], which is how the registry dispatches
//! without knowing concrete collector types.

use crate::aggregate::aggregate;
use crate::cache::BucketSubscription;
use crate::error::Result;
use crate::sync::SyncResult;
use crate::types::{Granularity, MetricPoint, MetricType, PermissionState, TimeRange};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Basic collector capability: permissions, sync and a live view of today.
#[async_trait]
pub trait DataCollector: Send + Sync {
    /// Metric this collector serves.
    fn metric_type(&self) -> MetricType;

    /// Current platform permission for the metric.
    async fn check_permissions(&self) -> PermissionState;

    /// Run one sync pass into the local cache.
    async fn sync(&self) -> SyncResult;

    /// Live hourly points for the current local day.
    fn observe(&self) -> MetricSubscription;

    /// Downcast to the granular capability, if implemented.
    fn as_granular(&self) -> Option<&dyn GranularDataCollector> {
        None
    }

    /// Capability set (for feature detection).
    fn capabilities(&self) -> CollectorCapabilities {
        CollectorCapabilities { granular: self.as_granular().is_some() }
    }
}

/// Granular capability: range reads at hourly or daily resolution.
#[async_trait]
pub trait GranularDataCollector: DataCollector {
    /// Points for `[from, to)` at `granularity`.
    async fn get(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Vec<MetricPoint>>;

    /// Live points for `[from, to)` at `granularity`.
    fn observe_granular(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        granularity: Granularity,
    ) -> MetricSubscription;
}

/// Collector capabilities. The basic capability is always present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorCapabilities {
    /// Supports range reads with granularity
    pub granular: bool,
}

/// Live metric points, re-aggregated whenever the underlying range changes.
///
/// Dropping the subscription unsubscribes.
pub struct MetricSubscription {
    buckets: BucketSubscription,
    granularity: Granularity,
}

impl MetricSubscription {
    pub fn new(buckets: BucketSubscription, granularity: Granularity) -> Self {
        Self { buckets, granularity }
    }

    pub fn range(&self) -> TimeRange {
        self.buckets.range()
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Wait for the next aggregated snapshot.
    ///
    /// Same emission rules as [`BucketSubscription::next`].
    pub async fn next(&mut self) -> Option<Result<Vec<MetricPoint>>> {
        let snapshot = self.buckets.next().await?;
        Some(snapshot.map(|buckets| aggregate(&buckets, self.granularity)))
    }
}
