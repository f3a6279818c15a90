//! Per-kind value extraction and statistic formatting.
//!
//! Flattens a [`MetricsSnapshot`] into `(name, kind, value)` samples in report
//! order: gauges, counters, histograms, meters, timers.

use em_common::TimeUnit;
use em_config::ValueMode;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::registry::{
    Distribution, GaugeValue, Histogram, Meter, MetricKind, MetricsSnapshot, Rates, Timer,
};

/// A value written at a record leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Statistics(Statistics),
}

impl From<&GaugeValue> for MetricValue {
    fn from(value: &GaugeValue) -> Self {
        match value {
            GaugeValue::Integer(v) => MetricValue::Integer(*v),
            GaugeValue::Float(v) => MetricValue::Float(*v),
            GaugeValue::Bool(v) => MetricValue::Bool(*v),
            GaugeValue::Text(v) => MetricValue::Text(v.clone()),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Integer(value)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Float(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

/// Ordered statistics bundle, serialized as a JSON object in field order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statistics {
    fields: Vec<(&'static str, MetricValue)>,
}

impl Statistics {
    fn push(&mut self, field: &'static str, value: impl Into<MetricValue>) {
        self.fields.push((field, value.into()));
    }

    pub fn get(&self, field: &str) -> Option<&MetricValue> {
        self.fields.iter().find(|(f, _)| *f == field).map(|(_, v)| v)
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|(f, _)| *f).collect()
    }
}

impl Serialize for Statistics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, value) in &self.fields {
            map.serialize_entry(field, value)?;
        }
        map.end()
    }
}

/// Rate and duration conversion factors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConversion {
    rate_unit: TimeUnit,
    duration_unit: TimeUnit,
}

impl Default for UnitConversion {
    fn default() -> Self {
        Self::new(TimeUnit::Seconds, TimeUnit::Milliseconds)
    }
}

impl UnitConversion {
    pub fn new(rate_unit: TimeUnit, duration_unit: TimeUnit) -> Self {
        Self {
            rate_unit,
            duration_unit,
        }
    }

    /// Events per second → events per rate unit.
    pub fn convert_rate(&self, per_second: f64) -> f64 {
        per_second * self.rate_unit.as_secs_f64()
    }

    /// Nanoseconds → duration units.
    pub fn convert_duration(&self, nanos: f64) -> f64 {
        nanos / self.duration_unit.as_nanos() as f64
    }

    pub fn rate_label(&self) -> &'static str {
        self.rate_unit.singular()
    }

    pub fn duration_label(&self) -> &'static str {
        self.duration_unit.plural()
    }
}

/// One flattened metric reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub kind: MetricKind,
    pub value: MetricValue,
}

/// Flatten a snapshot into samples, in report order.
pub fn flatten(snapshot: &MetricsSnapshot, mode: ValueMode, units: &UnitConversion) -> Vec<Sample> {
    let mut samples = Vec::with_capacity(snapshot.len());

    for (name, gauge) in &snapshot.gauges {
        samples.push(sample(name, MetricKind::Gauge, MetricValue::from(gauge)));
    }
    for (name, counter) in &snapshot.counters {
        samples.push(sample(name, MetricKind::Counter, counter.count.into()));
    }
    for (name, histogram) in &snapshot.histograms {
        let value = match mode {
            ValueMode::Primary => histogram.count.into(),
            ValueMode::Statistics => MetricValue::Statistics(histogram_stats(histogram)),
        };
        samples.push(sample(name, MetricKind::Histogram, value));
    }
    for (name, meter) in &snapshot.meters {
        let value = match mode {
            ValueMode::Primary => meter.count.into(),
            ValueMode::Statistics => MetricValue::Statistics(meter_stats(meter, units)),
        };
        samples.push(sample(name, MetricKind::Meter, value));
    }
    for (name, timer) in &snapshot.timers {
        let value = match mode {
            ValueMode::Primary => timer.count.into(),
            ValueMode::Statistics => MetricValue::Statistics(timer_stats(timer, units)),
        };
        samples.push(sample(name, MetricKind::Timer, value));
    }

    samples
}

fn sample(name: &str, kind: MetricKind, value: MetricValue) -> Sample {
    Sample {
        name: name.to_string(),
        kind,
        value,
    }
}

/// `count,max,mean,min,stddev,p50,p75,p95,p98,p99,p999`
pub fn histogram_stats(histogram: &Histogram) -> Statistics {
    let d = &histogram.distribution;
    let mut stats = Statistics::default();
    stats.push("count", histogram.count);
    stats.push("max", d.max);
    stats.push("mean", d.mean);
    stats.push("min", d.min);
    stats.push("stddev", d.stddev);
    push_percentiles(&mut stats, d, |v| v);
    stats
}

/// `count,mean_rate,m1_rate,m5_rate,m15_rate,rate_unit`
pub fn meter_stats(meter: &Meter, units: &UnitConversion) -> Statistics {
    let mut stats = Statistics::default();
    stats.push("count", meter.count);
    push_rates(&mut stats, &meter.rates, units);
    stats.push("rate_unit", format!("events/{}", units.rate_label()).as_str());
    stats
}

/// Histogram fields with durations converted, then rates, then unit labels.
pub fn timer_stats(timer: &Timer, units: &UnitConversion) -> Statistics {
    let d = &timer.distribution;
    let convert = |v: f64| units.convert_duration(v);
    let mut stats = Statistics::default();
    stats.push("count", timer.count);
    stats.push("max", convert(d.max as f64));
    stats.push("mean", convert(d.mean));
    stats.push("min", convert(d.min as f64));
    stats.push("stddev", convert(d.stddev));
    push_percentiles(&mut stats, d, convert);
    push_rates(&mut stats, &timer.rates, units);
    stats.push("rate_unit", format!("calls/{}", units.rate_label()).as_str());
    stats.push("duration_unit", units.duration_label());
    stats
}

fn push_percentiles(stats: &mut Statistics, d: &Distribution, convert: impl Fn(f64) -> f64) {
    stats.push("p50", convert(d.p50));
    stats.push("p75", convert(d.p75));
    stats.push("p95", convert(d.p95));
    stats.push("p98", convert(d.p98));
    stats.push("p99", convert(d.p99));
    stats.push("p999", convert(d.p999));
}

fn push_rates(stats: &mut Statistics, rates: &Rates, units: &UnitConversion) {
    stats.push("mean_rate", units.convert_rate(rates.mean_rate));
    stats.push("m1_rate", units.convert_rate(rates.m1_rate));
    stats.push("m5_rate", units.convert_rate(rates.m5_rate));
    stats.push("m15_rate", units.convert_rate(rates.m15_rate));
}
