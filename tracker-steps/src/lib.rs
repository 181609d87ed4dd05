//! Step-count metric module.
//!
//! [`install`] wires a [`StepsCollector`] onto a [`HealthDataManager`]:
//! a bucket cache on the shared state database, a sync engine fed by the
//! platform source, and a registry entry under [`MetricType::Steps`].

mod collector;

pub use collector::StepsCollector;

use std::sync::Arc;
use tracing::info;
use tracker_core::{
    BucketCache, Clock, HealthDataManager, HealthSource, MetricType, SyncEngine, SyncSettings,
    SyncWorker, SystemClock,
};

/// Job name of the recurring step sync.
pub const WORK_NAME: &str = "steps_sync";

/// Build the steps collector and register it with `manager`.
pub async fn install(
    manager: &HealthDataManager,
    source: Arc<dyn HealthSource>,
) -> Arc<StepsCollector> {
    install_with_clock(manager, source, None).await
}

/// [`install`] with an injected clock shared by the engine and the collector.
pub async fn install_with_clock(
    manager: &HealthDataManager,
    source: Arc<dyn HealthSource>,
    clock: Option<Arc<dyn Clock>>,
) -> Arc<StepsCollector> {
    let state = manager.state().clone();
    let cache = BucketCache::new(state.clone(), MetricType::Steps);
    let source_name = source.name().to_string();

    let clock = clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
    let engine = SyncEngine::new(source, state, cache, SyncSettings::from(manager.config()))
        .with_clock(clock.clone());
    let collector = Arc::new(StepsCollector::new(engine).with_clock(clock));

    manager.register_collector(MetricType::Steps, collector.clone()).await;
    info!(source = %source_name, "Steps module installed");

    collector
}

/// Recurring sync job for the steps collector.
pub fn sync_worker(collector: Arc<StepsCollector>) -> SyncWorker {
    SyncWorker::new(WORK_NAME, collector)
}
