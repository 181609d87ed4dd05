//! Core metrics definitions.
//!
//! All metrics follow Prometheus naming conventions:
//! - `_total` suffix for counters
//! - `_seconds` suffix for histograms measuring duration

use metrics::{describe_counter, describe_histogram};

/// Register all core metrics with descriptions.
///
/// This ensures metrics appear in the host's exporter with proper metadata.
pub fn register_core_metrics() {
    // Sync engine
    describe_counter!("tracker_sync_passes_total", "Sync passes run (by metric, outcome)");
    describe_counter!(
        "tracker_sync_coalesced_total",
        "Sync calls that waited on an in-flight pass and reused its outcome (by metric)"
    );
    describe_histogram!("tracker_sync_duration_seconds", "Sync pass duration (by metric)");

    // Bucket cache
    describe_counter!("tracker_buckets_upserted_total", "Hour buckets written (by metric)");
    describe_counter!(
        "tracker_buckets_removed_total",
        "Hour buckets dropped because the source no longer reports them (by metric)"
    );
    describe_counter!(
        "tracker_buckets_pruned_total",
        "Hour buckets removed by retention pruning (by metric)"
    );

    // Registry
    describe_counter!("tracker_registry_lookups_total", "Collector lookups (by result: hit, miss)");
    describe_counter!(
        "tracker_registry_changes_total",
        "Collector registrations and removals (by action)"
    );

    // Scheduling
    describe_counter!("tracker_worker_runs_total", "Scheduled sync runs (by metric, outcome)");

    // Database
    describe_counter!("tracker_db_errors_total", "Database failures (by operation)");
}
