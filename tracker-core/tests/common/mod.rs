//! Scripted health source shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracker_core::types::truncate_to_hour;
use tracker_core::{
    ChangeEvent, ChangesPage, HealthSource, MetricType, PermissionState, SourceBucket,
    SourceError, SourceResult, TimeRange,
};

#[derive(Default)]
struct Inner {
    /// Authoritative hourly totals.
    truth: BTreeMap<DateTime<Utc>, u64>,
    /// Change log; a token is a position in it.
    log: Vec<ChangeEvent>,
    permission: Option<PermissionState>,
    /// Fail `changes_since` when asked for this page position.
    fail_changes_at: Option<usize>,
    /// Fail every call with `Unavailable`.
    unavailable: bool,
    aggregate_windows: Vec<TimeRange>,
}

/// In-memory platform with a token-paged change feed.
pub struct ScriptedSource {
    inner: Mutex<Inner>,
    page_size: usize,
    latency: std::time::Duration,
    pub aggregate_calls: AtomicUsize,
    pub token_calls: AtomicUsize,
    pub changes_calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(page_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            page_size,
            latency: std::time::Duration::ZERO,
            aggregate_calls: AtomicUsize::new(0),
            token_calls: AtomicUsize::new(0),
            changes_calls: AtomicUsize::new(0),
        }
    }

    /// Delay every aggregate call, to keep passes in flight.
    pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Add a record without emitting a change event (history that predates
    /// the first token).
    pub fn seed(&self, start: DateTime<Utc>, count: u64) {
        let mut inner = self.inner.lock().unwrap();
        *inner.truth.entry(truncate_to_hour(start)).or_default() += count;
    }

    /// Add a record spanning `minutes` from `start` and log its upsert.
    pub fn record(&self, start: DateTime<Utc>, minutes: i64, count: u64) {
        let mut inner = self.inner.lock().unwrap();
        *inner.truth.entry(truncate_to_hour(start)).or_default() += count;
        inner.log.push(ChangeEvent::Upsert {
            range: TimeRange::new(start, start + Duration::minutes(minutes)),
        });
    }

    /// Drop an hour from the source history without logging anything.
    pub fn remove_hour(&self, start: DateTime<Utc>) {
        self.inner.lock().unwrap().truth.remove(&truncate_to_hour(start));
    }

    /// Empty the hour containing `start` and log an upsert over the edited
    /// span, as the platform does when a record is shortened or moved.
    pub fn retract(&self, start: DateTime<Utc>, minutes: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.truth.remove(&truncate_to_hour(start));
        inner.log.push(ChangeEvent::Upsert {
            range: TimeRange::new(start, start + Duration::minutes(minutes)),
        });
    }

    pub fn record_deletion(&self, record_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.log.push(ChangeEvent::Deletion { record_id: record_id.to_string() });
    }

    pub fn set_permission(&self, permission: PermissionState) {
        self.inner.lock().unwrap().permission = Some(permission);
    }

    pub fn fail_changes_at(&self, position: Option<usize>) {
        self.inner.lock().unwrap().fail_changes_at = position;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unwrap().unavailable = unavailable;
    }

    pub fn aggregate_windows(&self) -> Vec<TimeRange> {
        self.inner.lock().unwrap().aggregate_windows.clone()
    }

    pub fn token_for_head(&self) -> String {
        token(self.inner.lock().unwrap().log.len())
    }

    pub fn truth(&self) -> BTreeMap<DateTime<Utc>, u64> {
        self.inner.lock().unwrap().truth.clone()
    }
}

fn token(position: usize) -> String {
    format!("t{}", position)
}

fn parse_token(token: &str) -> SourceResult<usize> {
    token
        .strip_prefix('t')
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| SourceError::Request(format!("bad token {}", token)))
}

#[async_trait]
impl HealthSource for ScriptedSource {
    async fn aggregate(
        &self,
        _metric: MetricType,
        range: TimeRange,
        bucket: Duration,
    ) -> SourceResult<Vec<SourceBucket>> {
        self.aggregate_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.unavailable {
            return Err(SourceError::Unavailable);
        }
        inner.aggregate_windows.push(range);

        Ok(inner
            .truth
            .iter()
            .filter(|(start, _)| range.contains(**start))
            .map(|(start, count)| SourceBucket {
                start: *start,
                end: (*start + bucket).min(range.end),
                count: Some(*count),
                zone_offset: None,
            })
            .collect())
    }

    async fn current_change_token(&self, _metrics: &[MetricType]) -> SourceResult<String> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.lock().unwrap();
        if inner.unavailable {
            return Err(SourceError::Unavailable);
        }
        Ok(token(inner.log.len()))
    }

    async fn changes_since(&self, since: &str) -> SourceResult<ChangesPage> {
        self.changes_calls.fetch_add(1, Ordering::SeqCst);
        let position = parse_token(since)?;
        let inner = self.inner.lock().unwrap();
        if inner.unavailable {
            return Err(SourceError::Unavailable);
        }
        if inner.fail_changes_at == Some(position) {
            return Err(SourceError::Request("injected page failure".to_string()));
        }

        let end = (position + self.page_size).min(inner.log.len());
        Ok(ChangesPage {
            events: inner.log[position.min(end)..end].to_vec(),
            next_token: token(end),
            has_more: end < inner.log.len(),
        })
    }

    async fn permission_state(&self, _metric: MetricType) -> PermissionState {
        self.inner.lock().unwrap().permission.unwrap_or(PermissionState::Granted)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
