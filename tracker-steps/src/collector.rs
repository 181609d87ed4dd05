//! Step-count collector.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};
use tracker_core::aggregate::{aggregate, start_of_day};
use tracker_core::{
    Clock, DataCollector, GranularDataCollector, Granularity, MetricPoint, MetricSubscription,
    MetricType, PermissionState, Result, SyncEngine, SyncResult, SystemClock, TimeRange,
};

/// Serves step counts from the local cache and keeps it in sync.
pub struct StepsCollector {
    engine: SyncEngine,
    clock: Arc<dyn Clock>,
}

impl StepsCollector {
    pub fn new(engine: SyncEngine) -> Self {
        Self { engine, clock: Arc::new(SystemClock) }
    }

    /// Pin "today" for [`DataCollector::observe`].
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Drop the cursor and re-fetch the lookback window.
    pub async fn force_full_sync(&self) -> SyncResult {
        self.engine.force_full_sync().await
    }

    fn today(&self) -> TimeRange {
        let today = self.clock.now().with_timezone(&Local).date_naive();
        TimeRange::new(start_of_day(today, &Local), start_of_day(today + Duration::days(1), &Local))
    }
}

#[async_trait]
impl DataCollector for StepsCollector {
    fn metric_type(&self) -> MetricType {
        MetricType::Steps
    }

    async fn check_permissions(&self) -> PermissionState {
        self.engine.check_permissions().await
    }

    async fn sync(&self) -> SyncResult {
        self.engine.sync().await
    }

    fn observe(&self) -> MetricSubscription {
        let today = self.today();
        self.observe_granular(today.start, today.end, Granularity::Hourly)
    }

    fn as_granular(&self) -> Option<&dyn GranularDataCollector> {
        Some(self)
    }
}

#[async_trait]
impl GranularDataCollector for StepsCollector {
    #[instrument(skip(self))]
    async fn get(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Vec<MetricPoint>> {
        let buckets = self.engine.cache().query(from, to).await?;
        debug!(buckets = buckets.len(), "Read step buckets");
        Ok(aggregate(&buckets, granularity))
    }

    fn observe_granular(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        granularity: Granularity,
    ) -> MetricSubscription {
        MetricSubscription::new(self.engine.cache().subscribe(from, to), granularity)
    }
}
