//! Platform health-data source abstraction.
//!
//! The tracker never talks to a platform SDK directly. Hosts implement
//! [`HealthSource`] over whatever binding they have; the sync engine only
//! needs aggregated reads, a change token and a token-paged change feed.

use crate::error::SourceError;
use crate::types::{MetricType, PermissionState, TimeRange};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Result type for source calls.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// One aggregated slice returned by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// `None` when the platform had no records for the slice.
    pub count: Option<u64>,
    /// `None` when the platform did not report an offset.
    pub zone_offset: Option<String>,
}

/// A change-feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A record was inserted or updated; `range` is the record's time span.
    Upsert { range: TimeRange },
    /// A record was deleted. The platform reports only its id.
    Deletion { record_id: String },
}

/// One page of the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangesPage {
    pub events: Vec<ChangeEvent>,
    /// Token to request the following page with.
    pub next_token: String,
    /// Whether another page is immediately available.
    pub has_more: bool,
}

/// Platform health-data source.
#[async_trait]
pub trait HealthSource: Send + Sync {
    /// Aggregate `metric` over `range`, sliced into `bucket`-wide windows.
    ///
    /// Slices are returned in ascending order.
    async fn aggregate(
        &self,
        metric: MetricType,
        range: TimeRange,
        bucket: Duration,
    ) -> SourceResult<Vec<SourceBucket>>;

    /// Token meaning "changes from now on" for the given metrics.
    async fn current_change_token(&self, metrics: &[MetricType]) -> SourceResult<String>;

    /// Next page of changes after `token`.
    async fn changes_since(&self, token: &str) -> SourceResult<ChangesPage>;

    /// Whether the host may read `metric`.
    async fn permission_state(&self, metric: MetricType) -> PermissionState;

    /// Source name (for logging).
    fn name(&self) -> &str;
}
