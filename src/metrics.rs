//! # Metric snapshots drained to downstream consumers.
//!
//! [`MetricSnapshot`] is the second payload type flowing through the drain
//! workers, next to [`RuntimeEvent`](crate::events::RuntimeEvent). Snapshots
//! carry no severity: there is no priority fast path for metrics, they are
//! always buffered and delivered in batches.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::drain::DrainItem;

/// One aggregated metric observation for an artifact.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricSnapshot {
    /// The artifact the metric belongs to.
    pub artifact_id: String,
    /// Metric category (e.g. `executionTime`).
    pub category: String,
    /// Which statistic this value represents (e.g. `average`, `count`).
    pub statistic: String,
    /// The observed value.
    pub value: f64,
    /// When the snapshot was taken.
    pub timestamp: SystemTime,
}

impl MetricSnapshot {
    /// Creates a snapshot timestamped now.
    pub fn new(
        artifact_id: impl Into<String>,
        category: impl Into<String>,
        statistic: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            category: category.into(),
            statistic: statistic.into(),
            value,
            timestamp: SystemTime::now(),
        }
    }
}

impl DrainItem for MetricSnapshot {}
