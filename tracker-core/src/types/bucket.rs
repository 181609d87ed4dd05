//! Hour buckets and the read-side metric points derived from them.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Width of one cache bucket in seconds.
pub const BUCKET_SECS: i64 = 3600;

/// One cached hour of a metric, keyed uniquely by `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourBucket {
    /// Inclusive start, aligned to an hour boundary.
    pub start: DateTime<Utc>,
    /// Exclusive end. `start + 1h` except for a trailing partial bucket.
    pub end: DateTime<Utc>,
    /// Summed metric count for the hour.
    pub count: u64,
    /// Zone offset the platform reported for the bucket (e.g. "+02:00" or "Z").
    pub source_zone_offset: String,
    /// When the bucket was last written by the sync engine.
    pub synced_at: DateTime<Utc>,
}

/// Public read-side value: one hourly or daily aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Start of the hour or of the local day.
    pub timestamp: DateTime<Utc>,
    pub count: u64,
}

/// Half-open instant range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whether `instant` falls inside the range.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Smallest hour-aligned window covering the range.
    ///
    /// The end is truncated to the hour and then extended by one hour, so a
    /// range ending exactly on a boundary still covers the following hour.
    pub fn covering_hours(&self) -> TimeRange {
        TimeRange {
            start: truncate_to_hour(self.start),
            end: truncate_to_hour(self.end) + Duration::seconds(BUCKET_SECS),
        }
    }
}

/// Round an instant down to the start of its UTC hour.
pub fn truncate_to_hour(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        - Duration::seconds(i64::from(instant.minute()) * 60 + i64::from(instant.second()))
        - Duration::nanoseconds(i64::from(instant.nanosecond()))
}
