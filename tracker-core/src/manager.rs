//! Public entry point for applications.
//!
//! The host builds one [`HealthDataManager`] in its composition root and hands
//! clones to metric modules (for registration) and to consumers (for reads).

use crate::collector::{DataCollector, MetricSubscription};
use crate::config::TrackerConfig;
use crate::error::Result;
use crate::registry::CollectorRegistry;
use crate::state::StateManager;
use crate::types::{Granularity, MetricPoint, MetricType};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument};

/// Shared state database, collector registry and configuration.
#[derive(Clone)]
pub struct HealthDataManager {
    state: StateManager,
    registry: CollectorRegistry,
    config: Arc<TrackerConfig>,
}

impl HealthDataManager {
    /// Open the state database described by `config`.
    #[instrument(skip(config))]
    pub async fn open(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        let state = StateManager::new(config.db_path()).await?;
        let manager = Self::with_state(state, config)?;
        info!("Health data manager ready");
        Ok(manager)
    }

    /// Build on an existing state database (e.g. in-memory for tests).
    pub fn with_state(state: StateManager, config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { state, registry: CollectorRegistry::new(), config: Arc::new(config) })
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn registry(&self) -> &CollectorRegistry {
        &self.registry
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Points for `type` over `[from, to)` at `granularity`.
    ///
    /// `Granularity::default()` is daily.
    pub async fn get(
        &self,
        metric: MetricType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Vec<MetricPoint>> {
        self.registry.get(metric, from, to, granularity).await
    }

    /// Live points for `type` over `[from, to)` at `granularity`.
    pub async fn observe(
        &self,
        metric: MetricType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<MetricSubscription> {
        self.registry.observe(metric, from, to, granularity).await
    }

    /// Whether a collector is registered for `metric`.
    pub async fn is_available(&self, metric: MetricType) -> bool {
        self.registry.is_available(metric).await
    }

    /// All registered metric types.
    pub async fn available_types(&self) -> BTreeSet<MetricType> {
        self.registry.available_types().await
    }

    /// Register a collector. Called once per metric module at startup.
    pub async fn register_collector(&self, metric: MetricType, collector: Arc<dyn DataCollector>) {
        self.registry.register(metric, collector).await;
    }

    /// Remove a collector (module teardown, test isolation).
    pub async fn unregister_collector(&self, metric: MetricType) -> bool {
        self.registry.unregister(metric).await
    }
}
