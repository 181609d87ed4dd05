//! Live range subscriptions over the bucket cache.
//!
//! # Example
//!
//! ```ignore
//! let mut sub = cache.subscribe(start_of_today, now);
//!
//! // First call yields the current snapshot, later calls wait for writes
//! // that touch the range.
//! while let Some(snapshot) = sub.next().await {
//!     println!("{} buckets", snapshot?.len());
//! }
//! ```

use super::{query_range, CacheChange};
use crate::error::Result;
use crate::state::StateManager;
use crate::types::{HourBucket, MetricType, TimeRange};
use tokio::sync::broadcast;
use tracing::debug;

/// Snapshot stream for one cache range.
///
/// Dropping the subscription unsubscribes.
pub struct BucketSubscription {
    state: StateManager,
    metric: MetricType,
    range: TimeRange,
    receiver: broadcast::Receiver<CacheChange>,
    primed: bool,
}

impl BucketSubscription {
    pub(super) fn new(
        state: StateManager,
        metric: MetricType,
        range: TimeRange,
        receiver: broadcast::Receiver<CacheChange>,
    ) -> Self {
        Self { state, metric, range, receiver, primed: false }
    }

    /// The subscribed range.
    pub fn range(&self) -> TimeRange {
        self.range
    }

    /// Wait for the next snapshot of the range.
    ///
    /// The first call returns immediately with the current contents; writes
    /// made between `subscribe` and that call are folded into it. Later calls
    /// return after an upsert or deletion touches a bucket inside the range. Returns `None` once every cache handle has been dropped.
    pub async fn next(&mut self) -> Option<Result<Vec<HourBucket>>> {
        if !self.primed {
            self.primed = true;
            // The snapshot below already reflects anything queued so far.
            self.discard_queued();
            return Some(self.snapshot().await);
        }

        loop {
            match self.receiver.recv().await {
                Ok(change) => {
                    if change.touches(&self.range) {
                        return Some(self.snapshot().await);
                    }
                    // Change is outside the range, keep waiting
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(metric = %self.metric, "Bucket subscriber lagged by {} notices", n);
                    // Missed notices may have touched the range
                    return Some(self.snapshot().await);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return None;
                }
            }
        }
    }

    fn discard_queued(&mut self) {
        loop {
            match self.receiver.try_recv() {
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    }

    async fn snapshot(&self) -> Result<Vec<HourBucket>> {
        query_range(&self.state, self.metric, self.range).await
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::BucketCache;
    use crate::state::StateManager;
    use crate::types::{HourBucket, MetricType};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn bucket(h: i64, count: u64) -> HourBucket {
        HourBucket {
            start: hour(h),
            end: hour(h + 1),
            count,
            source_zone_offset: "Z".to_string(),
            synced_at: hour(0),
        }
    }

    #[tokio::test]
    async fn test_first_snapshot_is_immediate() {
        let state = StateManager::new_in_memory().await.unwrap();
        let cache = BucketCache::new(state, MetricType::Steps);
        cache.upsert(&[bucket(1, 7)]).await.unwrap();

        let mut sub = cache.subscribe(hour(0), hour(3));
        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot, vec![bucket(1, 7)]);
    }

    #[tokio::test]
    async fn test_emits_only_for_touching_writes() {
        let state = StateManager::new_in_memory().await.unwrap();
        let cache = BucketCache::new(state, MetricType::Steps);
        let mut sub = cache.subscribe(hour(0), hour(3));
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        // Outside the window: no emission
        cache.upsert(&[bucket(5, 1)]).await.unwrap();
        let pending = tokio::time::timeout(std::time::Duration::from_millis(50), sub.next()).await;
        assert!(pending.is_err(), "write outside the range must not emit");

        // Inside the window: one emission with the new contents
        cache.upsert(&[bucket(2, 9)]).await.unwrap();
        let snapshot = tokio::time::timeout(std::time::Duration::from_millis(500), sub.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(snapshot, vec![bucket(2, 9)]);
    }

    #[tokio::test]
    async fn test_emits_on_pruning_inside_range() {
        let state = StateManager::new_in_memory().await.unwrap();
        let cache = BucketCache::new(state, MetricType::Steps);
        cache.upsert(&[bucket(0, 1), bucket(1, 1), bucket(10, 1)]).await.unwrap();

        let mut sub = cache.subscribe(hour(1), hour(5));
        assert_eq!(sub.next().await.unwrap().unwrap().len(), 1);

        // Removes hour 0 only: outside the subscribed range
        cache.delete_before(hour(1)).await.unwrap();
        let pending = tokio::time::timeout(std::time::Duration::from_millis(50), sub.next()).await;
        assert!(pending.is_err());

        cache.delete_before(hour(2)).await.unwrap();
        let snapshot = tokio::time::timeout(std::time::Duration::from_millis(500), sub.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_write_before_first_read_emits_once() {
        let state = StateManager::new_in_memory().await.unwrap();
        let cache = BucketCache::new(state, MetricType::Steps);

        let mut sub = cache.subscribe(hour(0), hour(3));
        cache.upsert(&[bucket(1, 40)]).await.unwrap();

        assert_eq!(sub.next().await.unwrap().unwrap(), vec![bucket(1, 40)]);
        let pending = tokio::time::timeout(std::time::Duration::from_millis(50), sub.next()).await;
        assert!(pending.is_err(), "write already in the first snapshot must not emit again");
    }

    #[tokio::test]
    async fn test_ends_when_cache_dropped() {
        let state = StateManager::new_in_memory().await.unwrap();
        let cache = BucketCache::new(state, MetricType::Steps);
        let mut sub = cache.subscribe(hour(0), hour(1));
        sub.next().await.unwrap().unwrap();

        drop(cache);
        assert!(sub.next().await.is_none());
    }
}
