//! Hourly and daily aggregation of cached buckets.
//!
//! Pure functions. Daily grouping uses the zone active when the aggregation
//! runs, not the offset stored on each bucket.

use crate::types::{Granularity, HourBucket, MetricPoint};
use chrono::{DateTime, Local, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use std::collections::BTreeMap;

/// Aggregate `buckets` at `granularity` in the local time zone.
pub fn aggregate(buckets: &[HourBucket], granularity: Granularity) -> Vec<MetricPoint> {
    match granularity {
        Granularity::Hourly => aggregate_hourly(buckets),
        Granularity::Daily => aggregate_daily(buckets),
    }
}

/// One point per bucket, in input order.
pub fn aggregate_hourly(buckets: &[HourBucket]) -> Vec<MetricPoint> {
    buckets.iter().map(|b| MetricPoint { timestamp: b.start, count: b.count }).collect()
}

/// Sum buckets per calendar day of the current local zone.
pub fn aggregate_daily(buckets: &[HourBucket]) -> Vec<MetricPoint> {
    aggregate_daily_in(buckets, &Local)
}

/// Sum buckets per calendar day of `tz`, keyed by the instant the day starts.
///
/// Points are sorted ascending by timestamp.
pub fn aggregate_daily_in<Tz: TimeZone>(buckets: &[HourBucket], tz: &Tz) -> Vec<MetricPoint> {
    let mut days: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for bucket in buckets {
        let day = bucket.start.with_timezone(tz).date_naive();
        *days.entry(day).or_default() += bucket.count;
    }

    days.into_iter()
        .map(|(day, count)| MetricPoint { timestamp: start_of_day(day, tz), count })
        .collect()
}

/// First instant of `day` in `tz`.
///
/// Midnight can be skipped by a DST jump; the day then starts at the first
/// valid local time.
pub fn start_of_day<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let mut candidate = day.and_time(NaiveTime::MIN);
    for _ in 0..=24 {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(t) => return t.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => candidate += chrono::Duration::minutes(30),
        }
    }
    Utc.from_utc_datetime(&candidate)
}
