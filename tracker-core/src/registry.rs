//! Collector registry for looking up metric collectors by type.
//!
//! One registry is constructed by the host's composition root and shared by
//! clone. Metric modules register at startup; consumers look collectors up by
//! [`MetricType`] and the registry checks capabilities before dispatching.

use crate::collector::{DataCollector, MetricSubscription};
use crate::error::{RegistryError, Result};
use crate::types::{Granularity, MetricPoint, MetricType};
use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Registry of metric collectors.
///
/// Uses RwLock for read-heavy workloads (many lookups, few writes). The lock
/// is never held across a collector call.
#[derive(Clone, Default)]
pub struct CollectorRegistry {
    collectors: Arc<RwLock<HashMap<MetricType, Arc<dyn DataCollector>>>>,
}

impl CollectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collector, replacing any previous one for `metric`.
    #[instrument(skip(self, collector), fields(metric = %metric))]
    pub async fn register(&self, metric: MetricType, collector: Arc<dyn DataCollector>) {
        if collector.metric_type() != metric {
            warn!(
                collector_metric = %collector.metric_type(),
                "Registering collector under a different metric type"
            );
        }

        let replaced = {
            let mut collectors = self.collectors.write().await;
            collectors.insert(metric, collector).is_some()
        };

        counter!("tracker_registry_changes_total", "action" => "register").increment(1);
        if replaced {
            info!("Replaced collector for {}", metric);
        } else {
            info!("Registered collector for {}", metric);
        }
    }

    /// Remove the collector for `metric`. Returns whether one was registered.
    #[instrument(skip(self), fields(metric = %metric))]
    pub async fn unregister(&self, metric: MetricType) -> bool {
        let removed = {
            let mut collectors = self.collectors.write().await;
            collectors.remove(&metric).is_some()
        };

        if removed {
            counter!("tracker_registry_changes_total", "action" => "unregister").increment(1);
            info!("Unregistered collector for {}", metric);
        } else {
            debug!("No collector registered for {}", metric);
        }

        removed
    }

    /// Look up the collector for `metric`.
    pub async fn get_collector(&self, metric: MetricType) -> Option<Arc<dyn DataCollector>> {
        let collectors = self.collectors.read().await;
        let result = collectors.get(&metric).cloned();

        if result.is_some() {
            counter!("tracker_registry_lookups_total", "result" => "hit").increment(1);
        } else {
            counter!("tracker_registry_lookups_total", "result" => "miss").increment(1);
        }

        result
    }

    /// Whether a collector is registered for `metric`.
    pub async fn is_available(&self, metric: MetricType) -> bool {
        self.collectors.read().await.contains_key(&metric)
    }

    /// All metric types with a registered collector.
    pub async fn available_types(&self) -> BTreeSet<MetricType> {
        self.collectors.read().await.keys().copied().collect()
    }

    /// Read points for `[from, to)` from the collector registered for `metric`.
    ///
    /// Fails with [`RegistryError::NotRegistered`] when no collector is
    /// registered and [`RegistryError::UnsupportedCapability`] when it is not
    /// granular.
    #[instrument(skip(self), fields(metric = %metric))]
    pub async fn get(
        &self,
        metric: MetricType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Vec<MetricPoint>> {
        let collector = self.require(metric).await?;
        let granular = collector.as_granular().ok_or(RegistryError::UnsupportedCapability {
            metric,
            operation: "get()",
        })?;

        granular.get(from, to, granularity).await
    }

    /// Live points for `[from, to)` from the collector registered for `metric`.
    pub async fn observe(
        &self,
        metric: MetricType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<MetricSubscription> {
        let collector = self.require(metric).await?;
        let granular = collector.as_granular().ok_or(RegistryError::UnsupportedCapability {
            metric,
            operation: "observe()",
        })?;

        Ok(granular.observe_granular(from, to, granularity))
    }

    async fn require(&self, metric: MetricType) -> Result<Arc<dyn DataCollector>> {
        match self.get_collector(metric).await {
            Some(collector) => Ok(collector),
            None => {
                warn!("Collector for {} is not registered", metric);
                Err(RegistryError::NotRegistered(metric).into())
            }
        }
    }
}
