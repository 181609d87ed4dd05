//! Metric identity, read granularity and permission gating.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of health metric a collector serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Steps,
    Sleep,
}

impl MetricType {
    /// Stable identifier used as the storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Steps => "steps",
            MetricType::Sleep => "sleep",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "steps" => Ok(MetricType::Steps),
            "sleep" => Ok(MetricType::Sleep),
            other => Err(format!("unknown metric type: {}", other)),
        }
    }
}

/// Aggregation level for reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hourly,
    #[default]
    Daily,
}

/// Whether the tracker may read the metric from the platform.
///
/// This is a gating signal, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    /// The platform capability is absent on this device or OS version.
    Unavailable,
}

impl PermissionState {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionState::Granted)
    }
}
