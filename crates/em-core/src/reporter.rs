//! Report cycle orchestration.
//!
//! One [`Reporter`] serves one executor stream. Each call to
//! [`Reporter::report`] flattens a registry snapshot, applies the sampling
//! filter, routes each name and feeds the batch scheduler. Nothing inside a
//! cycle propagates an error to the caller.

use em_common::{Error, Result, TimeUnit};
use em_config::{ReporterConfig, SinkConfig, ValueMode, DEFAULT_SYNC_EVERY};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::batch::{BatchScheduler, BatchStats, Offer};
use crate::clock::{Clock, SystemClock};
use crate::filter::{AllMetrics, MetricFilter, RegexFilter};
use crate::registry::MetricsSnapshot;
use crate::route::route;
use crate::sink::{BrokerConnector, DurableLogSink, MetricSink, PublishSink};
use crate::stats::{flatten, UnitConversion};

/// Reporter counters, including the silent-drop outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReporterStats {
    pub cycles: u64,
    pub samples_seen: u64,
    pub samples_filtered: u64,
    pub dropped_unroutable: u64,
    #[serde(flatten)]
    pub batch: BatchStats,
}

/// Builder for [`Reporter`].
pub struct ReporterBuilder {
    rate_unit: TimeUnit,
    duration_unit: TimeUnit,
    clock: Arc<dyn Clock>,
    filter: Box<dyn MetricFilter>,
    value_mode: ValueMode,
    sync_every: u64,
    hostname: Option<String>,
}

impl Default for ReporterBuilder {
    fn default() -> Self {
        Self {
            rate_unit: TimeUnit::Seconds,
            duration_unit: TimeUnit::Milliseconds,
            clock: Arc::new(SystemClock),
            filter: Box::new(AllMetrics),
            value_mode: ValueMode::Primary,
            sync_every: DEFAULT_SYNC_EVERY,
            hostname: None,
        }
    }
}

impl ReporterBuilder {
    /// Convert rates to the given unit.
    pub fn rate_unit(mut self, unit: TimeUnit) -> Self {
        self.rate_unit = unit;
        self
    }

    /// Convert durations to the given unit.
    pub fn duration_unit(mut self, unit: TimeUnit) -> Self {
        self.duration_unit = unit;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Only report metrics accepted by `filter`.
    pub fn filter(mut self, filter: impl MetricFilter + 'static) -> Self {
        self.filter = Box::new(filter);
        self
    }

    pub fn value_mode(mut self, mode: ValueMode) -> Self {
        self.value_mode = mode;
        self
    }

    pub fn sync_every(mut self, rows: u64) -> Self {
        self.sync_every = rows;
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn build(self, sink: impl MetricSink + 'static) -> Reporter {
        let hostname = self
            .hostname
            .unwrap_or_else(|| ReporterConfig::default().resolved_hostname());
        Reporter {
            scheduler: BatchScheduler::new(Box::new(sink), hostname, self.sync_every),
            clock: self.clock,
            filter: self.filter,
            value_mode: self.value_mode,
            units: UnitConversion::new(self.rate_unit, self.duration_unit),
            stats: ReporterStats::default(),
        }
    }
}

/// Scheduled reporter for one executor stream.
pub struct Reporter {
    scheduler: BatchScheduler,
    clock: Arc<dyn Clock>,
    filter: Box<dyn MetricFilter>,
    value_mode: ValueMode,
    units: UnitConversion,
    stats: ReporterStats,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("scheduler", &self.scheduler)
            .field("value_mode", &self.value_mode)
            .field("units", &self.units)
            .finish()
    }
}

impl Reporter {
    pub fn builder() -> ReporterBuilder {
        ReporterBuilder::default()
    }

    /// Build a reporter from configuration.
    ///
    /// Publish sinks need a broker transport; `connector` is required for them
    /// and ignored otherwise.
    pub fn from_config(
        config: &ReporterConfig,
        clock: Arc<dyn Clock>,
        connector: Option<Box<dyn BrokerConnector>>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        let sink: Box<dyn MetricSink> = match &config.sink {
            SinkConfig::DurableLog { directory } => Box::new(DurableLogSink::new(directory)),
            SinkConfig::Publish { host, port } => {
                let connector = connector.ok_or_else(|| {
                    Error::Config("publish sink configured but no broker transport available".into())
                })?;
                Box::new(PublishSink::new(host.clone(), *port, connector))
            }
        };

        let builder = Reporter::builder()
            .rate_unit(config.rate_unit)
            .duration_unit(config.duration_unit)
            .clock(clock)
            .value_mode(config.value_mode)
            .sync_every(config.sync_every)
            .hostname(config.resolved_hostname());

        let builder = if config.filter.is_empty() {
            builder
        } else {
            builder.filter(RegexFilter::from_config(&config.filter)?)
        };

        Ok(builder.build(sink))
    }

    /// Run one report cycle over `snapshot`, timestamped by the clock.
    pub fn report(&mut self, snapshot: &MetricsSnapshot) {
        if self.scheduler.is_stopped() {
            debug!("report called after stop; ignoring snapshot");
            return;
        }
        let timestamp = self.clock.now_seconds();
        self.stats.cycles += 1;
        self.scheduler.begin_cycle();

        for sample in flatten(snapshot, self.value_mode, &self.units) {
            self.stats.samples_seen += 1;
            if !self.filter.matches(&sample.name, sample.kind) {
                self.stats.samples_filtered += 1;
                continue;
            }
            let Some(key) = route(&sample.name) else {
                self.stats.dropped_unroutable += 1;
                trace!(metric = %sample.name, "metric name not routable");
                continue;
            };
            if let Offer::Dropped(reason) =
                self.scheduler.offer(&sample.name, key, sample.value, timestamp)
            {
                trace!(metric = %sample.name, ?reason, "sample not batched");
            }
        }
    }

    /// Flush the open batch and release the sink. Idempotent.
    pub fn stop(&mut self) {
        self.scheduler.stop();
        debug!(stats = ?self.stats(), "reporter stopped");
    }

    pub fn stats(&self) -> ReporterStats {
        ReporterStats {
            batch: self.scheduler.stats(),
            ..self.stats
        }
    }

    pub fn scheduler(&self) -> &BatchScheduler {
        &self.scheduler
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.scheduler.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::registry::{GaugeValue, MetricKind};
    use crate::sink::{RecordingSink, SinkCall};

    fn reporter(sink: &RecordingSink, clock: &Arc<ManualClock>) -> Reporter {
        Reporter::builder()
            .clock(clock.clone())
            .hostname("host")
            .build(sink.clone())
    }

    #[test]
    fn test_unroutable_names_never_open_sink() {
        let sink = RecordingSink::new();
        let clock = Arc::new(ManualClock::at_seconds(100));
        let mut r = reporter(&sink, &clock);

        r.report(&MetricsSnapshot::new().with_counter("notapp.3.x.y", 1));
        r.report(&MetricsSnapshot::new().with_counter("app-1.driver.x.y", 1));
        r.stop();

        assert!(sink.calls().is_empty());
        assert_eq!(r.stats().dropped_unroutable, 2);
        assert_eq!(r.stats().cycles, 2);
    }

    #[test]
    fn test_filter_runs_before_routing() {
        let sink = RecordingSink::new();
        let clock = Arc::new(ManualClock::at_seconds(100));
        let mut r = Reporter::builder()
            .clock(clock.clone())
            .hostname("host")
            .filter(|_: &str, kind: MetricKind| kind != MetricKind::Gauge)
            .build(sink.clone());

        let snapshot = MetricsSnapshot::new()
            .with_gauge("app-1.3.src.g", GaugeValue::Integer(1))
            .with_counter("app-1.3.src.c", 2);
        r.report(&snapshot);
        clock.set_seconds(101);
        r.report(&MetricsSnapshot::new().with_counter("app-1.3.src.c", 3));

        let emitted = sink.emitted();
        assert_eq!(emitted.len(), 1);
        let record: serde_json::Value = serde_json::from_str(&emitted[0]).unwrap();
        assert_eq!(record["values"], serde_json::json!({"c": 2}));
        assert_eq!(r.stats().samples_filtered, 1);
        assert_eq!(r.stats().samples_seen, 3);
    }

    #[test]
    fn test_millisecond_clock_truncates_to_seconds() {
        let sink = RecordingSink::new();
        let clock = Arc::new(ManualClock::new(100_200));
        let mut r = reporter(&sink, &clock);

        r.report(&MetricsSnapshot::new().with_counter("app-1.3.src.a", 1));
        clock.set_millis(100_900);
        r.report(&MetricsSnapshot::new().with_counter("app-1.3.src.b", 2));
        assert!(sink.emitted().is_empty());

        clock.set_millis(101_000);
        r.report(&MetricsSnapshot::new().with_counter("app-1.3.src.a", 3));
        assert_eq!(sink.emitted().len(), 1);
    }

    #[test]
    fn test_drop_flushes_open_batch() {
        let sink = RecordingSink::new();
        let clock = Arc::new(ManualClock::at_seconds(5));
        {
            let mut r = reporter(&sink, &clock);
            r.report(&MetricsSnapshot::new().with_counter("app-1.3.src.a", 1));
        }
        assert_eq!(sink.emitted().len(), 1);
        assert_eq!(sink.calls().last(), Some(&SinkCall::Close));
    }

    #[test]
    fn test_report_after_stop_is_ignored() {
        let sink = RecordingSink::new();
        let clock = Arc::new(ManualClock::at_seconds(5));
        let mut r = reporter(&sink, &clock);
        r.report(&MetricsSnapshot::new().with_counter("app-1.3.src.a", 1));
        r.stop();
        clock.set_seconds(6);
        r.report(&MetricsSnapshot::new().with_counter("app-1.3.src.a", 2));
        assert_eq!(r.stats().cycles, 1);
        assert_eq!(sink.emitted().len(), 1);
    }

    #[test]
    fn test_from_config_requires_connector_for_publish() {
        let config = ReporterConfig {
            sink: SinkConfig::Publish {
                host: "broker".to_string(),
                port: 1883,
            },
            ..ReporterConfig::default()
        };
        let err = Reporter::from_config(&config, Arc::new(SystemClock), None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let config = ReporterConfig {
            sync_every: 0,
            ..ReporterConfig::default()
        };
        assert!(Reporter::from_config(&config, Arc::new(SystemClock), None).is_err());
    }
}
