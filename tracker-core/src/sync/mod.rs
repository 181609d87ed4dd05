//! Incremental synchronization of one metric into the bucket cache.
//!
//! # Passes
//!
//! ```text
//!   NoCursor ──(initial: token, lookback fetch, save token)──► CursorSet
//!   CursorSet ──(drain pages, re-fetch windows, save token, prune)──► CursorSet'
//! ```
//!
//! Change events are never applied as deltas. Each upsert event is widened to
//! the hour-aligned window covering it and that window is re-fetched from the
//! source, replacing the cached window. Replaying a page rewrites the same
//! buckets with the same values, and hours the source no longer reports
//! disappear on the next fetch that covers them.
//! The cursor is written once per pass, after every page has been drained and
//! stored; a failed pass leaves it where it was.

use crate::aggregate::start_of_day;
use crate::cache::BucketCache;
use crate::clock::{Clock, SystemClock};
use crate::config::TrackerConfig;
use crate::error::SyncError;
use crate::source::{ChangeEvent, HealthSource};
use crate::state::{CursorStore, StateManager};
use crate::types::{HourBucket, MetricType, PermissionState, TimeRange, BUCKET_SECS};
use chrono::{DateTime, Duration, Local, Utc};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Outcome of one sync pass.
pub type SyncResult = std::result::Result<(), SyncError>;

/// Zone offset recorded when the source reports none.
const UTC_OFFSET: &str = "Z";

/// Windows and horizons used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Days fetched by an initial sync, counted back from the start of today.
    pub lookback_days: u32,
    /// Buckets older than this many days are pruned after an incremental pass.
    pub retention_days: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self { lookback_days: 30, retention_days: 366 }
    }
}

impl From<&TrackerConfig> for SyncSettings {
    fn from(config: &TrackerConfig) -> Self {
        Self { lookback_days: config.lookback_days, retention_days: config.retention_days }
    }
}

#[derive(Default)]
struct PassState {
    last_outcome: Option<SyncResult>,
}

/// Sync engine for a single metric.
///
/// At most one pass runs at a time. A caller that arrives while a pass is in
/// flight waits for it and returns its outcome instead of starting another.
pub struct SyncEngine {
    metric: MetricType,
    source: Arc<dyn HealthSource>,
    cache: BucketCache,
    cursor: CursorStore,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
    pass: Mutex<PassState>,
    /// Number of finished passes; lets a waiter detect that it was coalesced.
    completed: AtomicU64,
}

impl SyncEngine {
    /// Create an engine writing into `cache` and keeping its cursor in `state`.
    pub fn new(
        source: Arc<dyn HealthSource>,
        state: StateManager,
        cache: BucketCache,
        settings: SyncSettings,
    ) -> Self {
        let metric = cache.metric();
        Self {
            metric,
            source,
            cursor: CursorStore::new(state, metric),
            cache,
            clock: Arc::new(SystemClock),
            settings,
            pass: Mutex::new(PassState::default()),
            completed: AtomicU64::new(0),
        }
    }

    /// Replace the wall clock (for tests and replays).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metric(&self) -> MetricType {
        self.metric
    }

    /// The cache this engine writes into.
    pub fn cache(&self) -> &BucketCache {
        &self.cache
    }

    /// Run one convergent pass: initial sync without a cursor, incremental
    /// drain with one.
    #[instrument(skip(self), fields(metric = %self.metric))]
    pub async fn sync(&self) -> SyncResult {
        let observed = self.completed.load(Ordering::Acquire);
        let mut pass = self.pass.lock().await;

        if self.completed.load(Ordering::Acquire) != observed {
            if let Some(outcome) = pass.last_outcome.clone() {
                metrics::counter!("tracker_sync_coalesced_total", "metric" => self.metric.as_str())
                    .increment(1);
                debug!("Sync pass finished while waiting, reusing its outcome");
                return outcome;
            }
        }

        self.finish(&mut pass, self.run_pass().await)
    }

    /// Discard the cursor and run a pass as if never synced.
    #[instrument(skip(self), fields(metric = %self.metric))]
    pub async fn force_full_sync(&self) -> SyncResult {
        let mut pass = self.pass.lock().await;
        info!("Forcing full sync");

        let outcome = match self.cursor.clear().await {
            Ok(()) => self.run_pass().await,
            Err(e) => Err(SyncError::from(e)),
        };
        self.finish(&mut pass, outcome)
    }

    /// Current platform permission for this metric.
    pub async fn check_permissions(&self) -> PermissionState {
        self.source.permission_state(self.metric).await
    }

    /// Whether an initial sync has completed and a cursor is saved.
    pub async fn has_cursor(&self) -> crate::Result<bool> {
        Ok(self.cursor.load().await?.is_some())
    }

    fn finish(&self, pass: &mut PassState, outcome: SyncResult) -> SyncResult {
        pass.last_outcome = Some(outcome.clone());
        self.completed.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    async fn run_pass(&self) -> SyncResult {
        let started = Instant::now();

        let outcome = match self.cursor.load().await {
            Ok(None) => self.initial_sync().await,
            Ok(Some(token)) => self.incremental_sync(token).await,
            Err(e) => Err(SyncError::from(e)),
        };

        let elapsed = started.elapsed();
        metrics::histogram!("tracker_sync_duration_seconds", "metric" => self.metric.as_str())
            .record(elapsed.as_secs_f64());

        match &outcome {
            Ok(()) => {
                metrics::counter!(
                    "tracker_sync_passes_total",
                    "metric" => self.metric.as_str(),
                    "outcome" => "success"
                )
                .increment(1);
                info!(elapsed_ms = elapsed.as_millis() as u64, "Sync pass complete");
            }
            Err(e) => {
                metrics::counter!(
                    "tracker_sync_passes_total",
                    "metric" => self.metric.as_str(),
                    "outcome" => "failure"
                )
                .increment(1);
                warn!(error = %e, "Sync pass failed");
            }
        }

        outcome
    }

    async fn initial_sync(&self) -> SyncResult {
        let now = self.clock.now();
        let start = lookback_start(now, self.settings.lookback_days).ok_or_else(|| {
            SyncError::FetchFailed(format!(
                "lookback of {} days is out of range",
                self.settings.lookback_days
            ))
        })?;
        let window = TimeRange::new(start, now);
        info!(from = %window.start, to = %window.end, "Running initial sync");

        // Requested before the fetch so changes landing during it are replayed.
        let token = self.source.current_change_token(&[self.metric]).await?;

        self.fetch_and_save(window).await?;
        self.cursor.save(&token).await?;

        Ok(())
    }

    async fn incremental_sync(&self, token: String) -> SyncResult {
        let retention = Duration::days(i64::from(self.settings.retention_days));
        let cutoff = self.clock.now().checked_sub_signed(retention).ok_or_else(|| {
            SyncError::StoreFailed(format!(
                "retention of {} days is out of range",
                self.settings.retention_days
            ))
        })?;

        let mut token = token;
        let mut pages = 0u32;

        loop {
            let page = self.source.changes_since(&token).await?;
            pages += 1;

            let windows: BTreeSet<TimeRange> = page
                .events
                .iter()
                .filter_map(|event| match event {
                    ChangeEvent::Upsert { range } => Some(range.covering_hours()),
                    ChangeEvent::Deletion { record_id } => {
                        debug!(record_id = %record_id, "Skipping deletion without time range");
                        None
                    }
                })
                .collect();

            debug!(
                page = pages,
                events = page.events.len(),
                windows = windows.len(),
                "Draining change page"
            );

            for window in windows {
                self.fetch_and_save(window).await?;
            }

            token = page.next_token;
            if !page.has_more {
                break;
            }
        }

        // Only a fully drained feed may move the cursor.
        self.cursor.save(&token).await?;

        let pruned = self.cache.delete_before(cutoff).await?;
        info!(pages, pruned, "Incremental sync drained change feed");

        Ok(())
    }

    async fn fetch_and_save(&self, window: TimeRange) -> SyncResult {
        let slices = self
            .source
            .aggregate(self.metric, window, Duration::seconds(BUCKET_SECS))
            .await?;

        let synced_at = self.clock.now();
        let buckets: Vec<HourBucket> = slices
            .into_iter()
            .map(|slice| HourBucket {
                start: slice.start,
                end: slice.end,
                count: slice.count.unwrap_or(0),
                source_zone_offset: slice.zone_offset.unwrap_or_else(|| UTC_OFFSET.to_string()),
                synced_at,
            })
            .collect();

        debug!(from = %window.start, to = %window.end, buckets = buckets.len(), "Fetched window");
        // The source is authoritative for the whole window, so hours it no
        // longer reports are dropped.
        self.cache.replace_range(window, &buckets).await?;

        Ok(())
    }
}

/// Start of the local day `days` before `now`, or `None` past the calendar.
fn lookback_start(now: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    let today = now.with_timezone(&Local).date_naive();
    let first = today.checked_sub_signed(Duration::days(i64::from(days)))?;
    Some(start_of_day(first, &Local))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_lookback_start_is_local_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 7, 20, 15, 30, 0).unwrap();
        let from = lookback_start(now, 30).unwrap();

        assert!(from <= now - Duration::days(29));
        assert!(from >= now - Duration::days(32));
        let local = from.with_timezone(&Local);
        assert_eq!(local.date_naive(), now.with_timezone(&Local).date_naive() - Duration::days(30));
    }

    #[test]
    fn test_lookback_start_past_calendar_is_none() {
        let now = Utc.with_ymd_and_hms(2026, 7, 20, 15, 30, 0).unwrap();
        assert!(lookback_start(now, u32::MAX).is_none());
    }

    #[test]
    fn test_settings_from_config() {
        let config = TrackerConfig { lookback_days: 7, retention_days: 90, ..Default::default() };
        assert_eq!(
            SyncSettings::from(&config),
            SyncSettings { lookback_days: 7, retention_days: 90 }
        );
        assert_eq!(SyncSettings::default(), SyncSettings { lookback_days: 30, retention_days: 366 });
    }
}
