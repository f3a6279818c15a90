//! Registry snapshot handed to each report cycle.
//!
//! Statistics are computed by the registry; this module only carries them.
//! Timer snapshots are in nanoseconds, rates are events per second.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metric kind, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Gauge,
    Counter,
    Histogram,
    Meter,
    Timer,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gauge => write!(f, "gauge"),
            Self::Counter => write!(f, "counter"),
            Self::Histogram => write!(f, "histogram"),
            Self::Meter => write!(f, "meter"),
            Self::Timer => write!(f, "timer"),
        }
    }
}

/// Gauge reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GaugeValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    pub count: i64,
}

/// Distribution snapshot shared by histograms and timers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub stddev: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub p98: f64,
    pub p99: f64,
    pub p999: f64,
}

/// Exponentially weighted rates, per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    pub mean_rate: f64,
    pub m1_rate: f64,
    pub m5_rate: f64,
    pub m15_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub count: i64,
    #[serde(flatten)]
    pub distribution: Distribution,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Meter {
    pub count: i64,
    #[serde(flatten)]
    pub rates: Rates,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Timer {
    pub count: i64,
    #[serde(flatten)]
    pub distribution: Distribution,
    #[serde(flatten)]
    pub rates: Rates,
}

/// One registry snapshot: five name-ordered maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(default)]
    pub gauges: BTreeMap<String, GaugeValue>,
    #[serde(default)]
    pub counters: BTreeMap<String, Counter>,
    #[serde(default)]
    pub histograms: BTreeMap<String, Histogram>,
    #[serde(default)]
    pub meters: BTreeMap<String, Meter>,
    #[serde(default)]
    pub timers: BTreeMap<String, Timer>,
}

impl MetricsSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gauge(mut self, name: impl Into<String>, value: GaugeValue) -> Self {
        self.gauges.insert(name.into(), value);
        self
    }

    pub fn with_counter(mut self, name: impl Into<String>, count: i64) -> Self {
        self.counters.insert(name.into(), Counter { count });
        self
    }

    pub fn with_histogram(mut self, name: impl Into<String>, histogram: Histogram) -> Self {
        self.histograms.insert(name.into(), histogram);
        self
    }

    pub fn with_meter(mut self, name: impl Into<String>, meter: Meter) -> Self {
        self.meters.insert(name.into(), meter);
        self
    }

    pub fn with_timer(mut self, name: impl Into<String>, timer: Timer) -> Self {
        self.timers.insert(name.into(), timer);
        self
    }

    /// Total number of metrics across all kinds.
    pub fn len(&self) -> usize {
        self.gauges.len()
            + self.counters.len()
            + self.histograms.len()
            + self.meters.len()
            + self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_deserializes_with_missing_kinds() {
        let snapshot: MetricsSnapshot = serde_json::from_str(
            r#"{"gauges": {"app-1.3.jvm.heap": 42, "app-1.3.jvm.name": "hotspot"}}"#,
        )
        .unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot.gauges["app-1.3.jvm.heap"],
            GaugeValue::Integer(42)
        );
        assert_eq!(
            snapshot.gauges["app-1.3.jvm.name"],
            GaugeValue::Text("hotspot".to_string())
        );
    }

    #[test]
    fn test_timer_fields_are_flat() {
        let timer: Timer = serde_json::from_str(
            r#"{"count": 3, "min": 1, "max": 9, "mean": 4.0, "stddev": 1.0,
                "p50": 4.0, "p75": 5.0, "p95": 8.0, "p98": 9.0, "p99": 9.0, "p999": 9.0,
                "mean_rate": 0.5, "m1_rate": 0.1, "m5_rate": 0.2, "m15_rate": 0.3}"#,
        )
        .unwrap();
        assert_eq!(timer.count, 3);
        assert_eq!(timer.distribution.max, 9);
        assert!((timer.rates.m15_rate - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_builder_and_len() {
        let snapshot = MetricsSnapshot::new()
            .with_counter("app-1.1.c", 1)
            .with_gauge("app-1.1.g", GaugeValue::Float(0.5));
        assert_eq!(snapshot.len(), 2);
        assert!(!snapshot.is_empty());
        assert!(MetricsSnapshot::new().is_empty());
    }
}
