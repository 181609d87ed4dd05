//! Bucketed metric cache.
//!
//! Stores hour buckets in SQLite, keyed by `(metric, start)`. Writers are the
//! sync engine (upsert, replace_range) and retention pruning (delete);
//! readers are the aggregator read path and live subscriptions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  replace / delete_before ┌────────────────────┐
//! │  SyncEngine  │ ────────────────────────►│    BucketCache     │
//! └──────────────┘                          │  ├─ hour_buckets   │
//!                                           │  └─ change notices │
//! ┌──────────────┐  query / subscribe       │      (broadcast)   │
//! │  Collectors  │ ◄────────────────────────│                    │
//! └──────────────┘                          └────────────────────┘
//! ```

use crate::error::{Result, TrackerError};
use crate::state::StateManager;
use crate::types::{HourBucket, MetricType, TimeRange};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, instrument};

mod subscription;

pub use subscription::BucketSubscription;

/// Maximum number of change notices buffered for slow subscribers.
const CHANGE_BUFFER_SIZE: usize = 64;

/// Bucket starts written or removed by one cache operation.
#[derive(Debug, Clone)]
pub(crate) struct CacheChange {
    starts: Arc<[DateTime<Utc>]>,
}

impl CacheChange {
    /// Whether the change touched any bucket starting inside `range`.
    pub(crate) fn touches(&self, range: &TimeRange) -> bool {
        self.starts.iter().any(|start| range.contains(*start))
    }
}

/// Durable hour-bucket cache for one metric.
///
/// Construct once per metric and clone the handle; clones share the change
/// notifier that drives subscriptions.
#[derive(Clone)]
pub struct BucketCache {
    state: StateManager,
    metric: MetricType,
    changes: broadcast::Sender<CacheChange>,
}

impl BucketCache {
    /// Create a cache handle for `metric` on the shared state database.
    pub fn new(state: StateManager, metric: MetricType) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER_SIZE);
        Self { state, metric, changes }
    }

    pub fn metric(&self) -> MetricType {
        self.metric
    }

    /// Insert or replace buckets by start. Last write wins.
    ///
    /// All buckets are written in one transaction, so readers observe either
    /// the previous rows or the complete batch.
    #[instrument(skip(self, buckets), fields(metric = %self.metric, buckets = buckets.len()))]
    pub async fn upsert(&self, buckets: &[HourBucket]) -> Result<()> {
        if buckets.is_empty() {
            return Ok(());
        }

        let mut tx = self.state.pool().begin().await.map_err(|e| db_error("upsert", e))?;
        self.write_buckets(&mut tx, buckets, "upsert").await?;
        tx.commit().await.map_err(|e| db_error("upsert", e))?;

        metrics::counter!("tracker_buckets_upserted_total", "metric" => self.metric.as_str())
            .increment(buckets.len() as u64);
        self.notify(buckets.iter().map(|b| b.start).collect());

        Ok(())
    }

    /// Make `buckets` the entire contents of `range`.
    ///
    /// Cached buckets starting inside `range` that are not in `buckets` are
    /// removed. The delete and the writes share one transaction and one
    /// change notice.
    #[instrument(skip(self, buckets), fields(metric = %self.metric, buckets = buckets.len()))]
    pub async fn replace_range(&self, range: TimeRange, buckets: &[HourBucket]) -> Result<()> {
        let mut tx =
            self.state.pool().begin().await.map_err(|e| db_error("replace_range", e))?;

        let cleared: Vec<i64> = sqlx::query_scalar(
            r#"
            DELETE FROM hour_buckets
            WHERE metric = ? AND start_ms >= ? AND start_ms < ?
            RETURNING start_ms
            "#,
        )
        .bind(self.metric.as_str())
        .bind(range.start.timestamp_millis())
        .bind(range.end.timestamp_millis())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| db_error("replace_range", e))?;

        self.write_buckets(&mut tx, buckets, "replace_range").await?;
        tx.commit().await.map_err(|e| db_error("replace_range", e))?;

        let written: BTreeSet<DateTime<Utc>> = buckets.iter().map(|b| b.start).collect();
        let mut touched = written.clone();
        let mut removed = 0u64;
        for start in cleared.into_iter().filter_map(DateTime::from_timestamp_millis) {
            if touched.insert(start) {
                removed += 1;
            }
        }

        metrics::counter!("tracker_buckets_upserted_total", "metric" => self.metric.as_str())
            .increment(written.len() as u64);
        if removed > 0 {
            metrics::counter!("tracker_buckets_removed_total", "metric" => self.metric.as_str())
                .increment(removed);
            debug!(removed, "Dropped buckets the source no longer reports");
        }
        if !touched.is_empty() {
            self.notify(touched.into_iter().collect());
        }

        Ok(())
    }

    async fn write_buckets(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        buckets: &[HourBucket],
        operation: &'static str,
    ) -> Result<()> {
        for bucket in buckets {
            sqlx::query(
                r#"
                INSERT INTO hour_buckets (metric, start_ms, end_ms, count, zone_offset, synced_at_ms)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(metric, start_ms) DO UPDATE SET
                    end_ms = excluded.end_ms,
                    count = excluded.count,
                    zone_offset = excluded.zone_offset,
                    synced_at_ms = excluded.synced_at_ms
                "#,
            )
            .bind(self.metric.as_str())
            .bind(bucket.start.timestamp_millis())
            .bind(bucket.end.timestamp_millis())
            .bind(i64::try_from(bucket.count).unwrap_or(i64::MAX))
            .bind(&bucket.source_zone_offset)
            .bind(bucket.synced_at.timestamp_millis())
            .execute(&mut **tx)
            .await
            .map_err(|e| db_error(operation, e))?;
        }
        Ok(())
    }

    /// Buckets with `from <= start < to`, ascending by start.
    #[instrument(skip(self), fields(metric = %self.metric))]
    pub async fn query(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<HourBucket>> {
        query_range(&self.state, self.metric, TimeRange::new(from, to)).await
    }

    /// Live view of `[from, to)`. See [`BucketSubscription`].
    pub fn subscribe(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> BucketSubscription {
        BucketSubscription::new(
            self.state.clone(),
            self.metric,
            TimeRange::new(from, to),
            self.changes.subscribe(),
        )
    }

    /// Remove every bucket with `start < threshold`. Returns the number removed.
    #[instrument(skip(self), fields(metric = %self.metric))]
    pub async fn delete_before(&self, threshold: DateTime<Utc>) -> Result<u64> {
        let removed: Vec<i64> = sqlx::query_scalar(
            "DELETE FROM hour_buckets WHERE metric = ? AND start_ms < ? RETURNING start_ms",
        )
        .bind(self.metric.as_str())
        .bind(threshold.timestamp_millis())
        .fetch_all(self.state.pool())
        .await
        .map_err(|e| db_error("delete_before", e))?;

        if removed.is_empty() {
            return Ok(0);
        }

        let starts = removed.into_iter().filter_map(DateTime::from_timestamp_millis).collect();
        let deleted = self.notify(starts);
        metrics::counter!("tracker_buckets_pruned_total", "metric" => self.metric.as_str())
            .increment(deleted);
        debug!(deleted, "Pruned buckets before retention cutoff");

        Ok(deleted)
    }

    /// Publish a change notice and return how many starts it carried.
    fn notify(&self, starts: Vec<DateTime<Utc>>) -> u64 {
        let touched = starts.len() as u64;
        // Ignore send errors (no subscribers)
        let _ = self.changes.send(CacheChange { starts: starts.into() });
        touched
    }
}

pub(crate) async fn query_range(
    state: &StateManager,
    metric: MetricType,
    range: TimeRange,
) -> Result<Vec<HourBucket>> {
    let rows = sqlx::query(
        r#"
        SELECT start_ms, end_ms, count, zone_offset, synced_at_ms
        FROM hour_buckets
        WHERE metric = ? AND start_ms >= ? AND start_ms < ?
        ORDER BY start_ms ASC
        "#,
    )
    .bind(metric.as_str())
    .bind(range.start.timestamp_millis())
    .bind(range.end.timestamp_millis())
    .fetch_all(state.pool())
    .await
    .map_err(|e| db_error("query", e))?;

    rows.iter().map(row_to_bucket).collect()
}

fn row_to_bucket(row: &SqliteRow) -> Result<HourBucket> {
    let count: i64 = row.get("count");
    Ok(HourBucket {
        start: millis_column(row, "start_ms")?,
        end: millis_column(row, "end_ms")?,
        count: u64::try_from(count).unwrap_or(0),
        source_zone_offset: row.get("zone_offset"),
        synced_at: millis_column(row, "synced_at_ms")?,
    })
}

fn millis_column(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let millis: i64 = row.get(column);
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        TrackerError::DatabaseError(format!("{} out of range: {}", column, millis))
    })
}

fn db_error(operation: &'static str, err: sqlx::Error) -> TrackerError {
    metrics::counter!("tracker_db_errors_total", "operation" => operation).increment(1);
    TrackerError::DatabaseError(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn bucket(h: i64, count: u64) -> HourBucket {
        HourBucket {
            start: hour(h),
            end: hour(h + 1),
            count,
            source_zone_offset: "Z".to_string(),
            synced_at: hour(48),
        }
    }

    async fn cache() -> BucketCache {
        let state = StateManager::new_in_memory().await.unwrap();
        BucketCache::new(state, MetricType::Steps)
    }

    #[tokio::test]
    async fn test_query_is_ordered_and_half_open() {
        let cache = cache().await;
        cache.upsert(&[bucket(3, 30), bucket(1, 10), bucket(2, 20)]).await.unwrap();

        let rows = cache.query(hour(1), hour(3)).await.unwrap();
        assert_eq!(rows, vec![bucket(1, 10), bucket(2, 20)]);

        assert!(cache.query(hour(4), hour(10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_is_last_write_wins() {
        let cache = cache().await;
        cache.upsert(&[bucket(0, 100)]).await.unwrap();
        cache.upsert(&[bucket(0, 250)]).await.unwrap();

        let rows = cache.query(hour(0), hour(1)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 250);
    }

    #[tokio::test]
    async fn test_metrics_do_not_share_buckets() {
        let state = StateManager::new_in_memory().await.unwrap();
        let steps = BucketCache::new(state.clone(), MetricType::Steps);
        let sleep = BucketCache::new(state, MetricType::Sleep);

        steps.upsert(&[bucket(0, 5)]).await.unwrap();
        assert!(sleep.query(hour(0), hour(1)).await.unwrap().is_empty());

        sleep.delete_before(hour(10)).await.unwrap();
        assert_eq!(steps.query(hour(0), hour(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_before_keeps_threshold_bucket() {
        let cache = cache().await;
        cache.upsert(&[bucket(0, 1), bucket(1, 1), bucket(2, 1)]).await.unwrap();

        let deleted = cache.delete_before(hour(1)).await.unwrap();
        assert_eq!(deleted, 1);

        let rows = cache.query(hour(0), hour(10)).await.unwrap();
        assert_eq!(rows.iter().map(|b| b.start).collect::<Vec<_>>(), vec![hour(1), hour(2)]);

        assert_eq!(cache.delete_before(hour(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replace_range_drops_unreported_hours() {
        let cache = cache().await;
        cache.upsert(&[bucket(0, 1), bucket(1, 1), bucket(2, 1), bucket(5, 1)]).await.unwrap();

        let mut first_hour = cache.subscribe(hour(0), hour(1));
        assert_eq!(first_hour.next().await.unwrap().unwrap().len(), 1);

        cache
            .replace_range(TimeRange::new(hour(0), hour(3)), &[bucket(1, 7)])
            .await
            .unwrap();

        let rows = cache.query(hour(0), hour(10)).await.unwrap();
        assert_eq!(rows, vec![bucket(1, 7), bucket(5, 1)]);

        // Removal alone counts as touching the range
        let snapshot = tokio::time::timeout(std::time::Duration::from_millis(500), first_hour.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_replace_range_with_nothing_clears_window() {
        let cache = cache().await;
        cache.upsert(&[bucket(3, 4), bucket(4, 4)]).await.unwrap();

        cache.replace_range(TimeRange::new(hour(3), hour(4)), &[]).await.unwrap();
        let rows = cache.query(hour(0), hour(10)).await.unwrap();
        assert_eq!(rows, vec![bucket(4, 4)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_readers_never_observe_partial_batch() {
        let temp = tempfile::TempDir::new().unwrap();
        let state = StateManager::new(temp.path().join("cache.db")).await.unwrap();
        let cache = BucketCache::new(state, MetricType::Steps);

        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for round in 1..=30u64 {
                    let batch: Vec<_> = (0..24).map(|h| bucket(h, round)).collect();
                    cache.replace_range(TimeRange::new(hour(0), hour(24)), &batch).await.unwrap();
                }
            })
        };

        let mut reads = 0;
        while !writer.is_finished() || reads == 0 {
            let rows = cache.query(hour(0), hour(24)).await.unwrap();
            if let Some(first) = rows.first() {
                assert_eq!(rows.len(), 24, "read a partially written batch");
                assert!(rows.iter().all(|b| b.count == first.count), "mixed batches in one read");
            }
            reads += 1;
        }
        writer.await.unwrap();

        let rows = cache.query(hour(0), hour(24)).await.unwrap();
        assert!(rows.iter().all(|b| b.count == 30));
    }

    proptest! {
        #[test]
        fn prop_last_write_wins(writes in prop::collection::vec((0i64..24, 0u64..10_000), 1..40)) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let cache = cache().await;
                let mut expected = std::collections::BTreeMap::new();
                for (h, count) in &writes {
                    cache.upsert(&[bucket(*h, *count)]).await.unwrap();
                    expected.insert(*h, *count);
                }

                let rows = cache.query(hour(0), hour(24)).await.unwrap();
                let actual: Vec<(i64, u64)> =
                    rows.iter().map(|b| ((b.start - hour(0)).num_hours(), b.count)).collect();
                let expected: Vec<(i64, u64)> = expected.into_iter().collect();
                assert_eq!(actual, expected);
            });
        }
    }
}
