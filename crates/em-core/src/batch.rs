//! Per-timestamp batching and sink delivery.
//!
//! # State machine
//!
//! ```text
//!          first routed sample, sink.open() ok
//!   Idle ───────────────────────────────────────▶ Open(t)
//!    ▲  │ open fails: drop, retry next cycle       │ │
//!    │  └──────────────┘                           │ │ same t: merge
//!    │                                             │ └─────────┘
//!    │ stop(): emit open batch, sink.close()       │ new t: emit batch(t), merge, Open(t')
//!    └─────────────────────────────────────────────┘
//! ```
//!
//! After every timestamp-driven emit, every `sync_every`-th row forces a
//! durable sync. The stop-time flush counts as a row but never triggers the
//! cadence sync; `close()` performs the final sync.

use em_common::{ApplicationId, Error, ExecutorId, HostTag, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::record::{MergeOutcome, Record};
use crate::route::RoutingKey;
use crate::sink::{MetricSink, StreamKey};
use crate::stats::MetricValue;

/// Wire form of one closed batch.
#[derive(Debug, Serialize)]
pub struct BatchRecord<'a> {
    pub timestamp: i64,
    pub values: &'a Record,
    pub host: &'a HostTag,
}

/// Why a routed sample did not enter the open batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// The sink could not be opened (now or earlier this cycle).
    SinkUnavailable,
    /// Sample belongs to a different (application, executor) stream.
    ForeignStream,
    /// Path collides with existing record structure.
    Conflict,
    /// Name had no path segments after the routing prefix.
    EmptyPath,
    /// Scheduler already stopped.
    Stopped,
}

/// What happened to one offered sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Merged into the open batch.
    Merged,
    /// Closed the previous batch, then merged into a new one.
    Rolled { emitted: bool },
    Dropped(DropReason),
}

/// Counters for scheduler outcomes, including silent drops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub merged: u64,
    pub rows_emitted: u64,
    pub syncs: u64,
    pub dropped_conflicts: u64,
    pub dropped_empty_path: u64,
    pub dropped_foreign: u64,
    pub dropped_sink_unavailable: u64,
    pub sink_open_failures: u64,
    pub sample_failures: u64,
    pub sync_failures: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Open { timestamp: i64 },
    Stopped,
}

/// Owns the open batch and the lazily opened sink.
pub struct BatchScheduler {
    hostname: String,
    sync_every: u64,
    sink: Box<dyn MetricSink>,
    stream: Option<StreamKey>,
    phase: Phase,
    record: Record,
    open_failed_this_cycle: bool,
    stats: BatchStats,
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("hostname", &self.hostname)
            .field("sink", &self.sink.kind())
            .field("stream", &self.stream)
            .field("phase", &self.phase)
            .field("stats", &self.stats)
            .finish()
    }
}

impl BatchScheduler {
    pub fn new(sink: Box<dyn MetricSink>, hostname: impl Into<String>, sync_every: u64) -> Self {
        Self {
            hostname: hostname.into(),
            sync_every: sync_every.max(1),
            sink,
            stream: None,
            phase: Phase::Idle,
            record: Record::new(),
            open_failed_this_cycle: false,
            stats: BatchStats::default(),
        }
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Stream the sink was opened for, once initialized.
    pub fn stream(&self) -> Option<&StreamKey> {
        self.stream.as_ref()
    }

    /// Timestamp of the open batch.
    pub fn open_timestamp(&self) -> Option<i64> {
        match self.phase {
            Phase::Open { timestamp } => Some(timestamp),
            _ => None,
        }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn is_stopped(&self) -> bool {
        self.phase == Phase::Stopped
    }

    /// Mark the start of a report cycle; a failed sink open is retried once per cycle.
    pub fn begin_cycle(&mut self) {
        self.open_failed_this_cycle = false;
    }

    /// Feed one routed sample observed at `timestamp` (seconds).
    pub fn offer(
        &mut self,
        name: &str,
        key: RoutingKey,
        value: MetricValue,
        timestamp: i64,
    ) -> Offer {
        let open_timestamp = match self.phase {
            Phase::Stopped => return self.drop_sample(name, DropReason::Stopped),
            Phase::Idle => None,
            Phase::Open { timestamp } => Some(timestamp),
        };

        let same_stream = self
            .stream
            .as_ref()
            .map(|stream| key.same_stream(&stream.application_id, &stream.executor_id));
        match same_stream {
            Some(true) => {}
            Some(false) => return self.drop_sample(name, DropReason::ForeignStream),
            None => {
                if !self.ensure_open(&key.application_id, &key.executor_id) {
                    return self.drop_sample(name, DropReason::SinkUnavailable);
                }
            }
        }

        let offer = match open_timestamp {
            Some(previous) if previous != timestamp => {
                let emitted = self.close_batch(previous, name);
                Offer::Rolled { emitted }
            }
            _ => Offer::Merged,
        };

        self.phase = Phase::Open { timestamp };
        match self.record.merge(&key.path, value) {
            outcome if outcome.is_written() => {
                self.stats.merged += 1;
                offer
            }
            MergeOutcome::Conflict => {
                self.stats.dropped_conflicts += 1;
                debug!(metric = %name, "metric path conflicts with record structure");
                match offer {
                    Offer::Merged => Offer::Dropped(DropReason::Conflict),
                    rolled => rolled,
                }
            }
            _ => {
                self.stats.dropped_empty_path += 1;
                debug!(metric = %name, "metric name has no path segments");
                match offer {
                    Offer::Merged => Offer::Dropped(DropReason::EmptyPath),
                    rolled => rolled,
                }
            }
        }
    }

    /// Emit any open batch and close the sink. Idempotent.
    pub fn stop(&mut self) {
        if self.phase == Phase::Stopped {
            return;
        }
        let open_timestamp = self.open_timestamp();
        self.phase = Phase::Stopped;

        if self.stream.is_none() {
            debug!("scheduler stopped before any sink was opened");
            return;
        }

        if let Some(timestamp) = open_timestamp {
            if !self.record.is_empty() {
                match self.emit_batch(timestamp) {
                    Ok(()) => self.stats.rows_emitted += 1,
                    Err(e) => {
                        self.stats.sample_failures += 1;
                        error!(error = %e, timestamp, "failed to flush final batch");
                    }
                }
            }
        }
        self.record.clear();

        if let Err(e) = self.sink.close() {
            error!(error = %e, sink = self.sink.kind(), "failed to close sink");
        }
        self.stream = None;
        info!(
            rows_emitted = self.stats.rows_emitted,
            dropped_conflicts = self.stats.dropped_conflicts,
            dropped_foreign = self.stats.dropped_foreign,
            "batch scheduler stopped"
        );
    }

    fn ensure_open(&mut self, application_id: &ApplicationId, executor_id: &ExecutorId) -> bool {
        if self.open_failed_this_cycle {
            return false;
        }
        let stream = StreamKey::new(application_id.clone(), executor_id.clone(), &self.hostname);
        match self.sink.open(&stream) {
            Ok(()) => {
                info!(
                    application = %stream.application_id,
                    executor = %stream.executor_id,
                    sink = self.sink.kind(),
                    "sink opened"
                );
                self.stream = Some(stream);
                true
            }
            Err(e) => {
                self.open_failed_this_cycle = true;
                self.stats.sink_open_failures += 1;
                error!(
                    error = %e,
                    application = %stream.application_id,
                    executor = %stream.executor_id,
                    sink = self.sink.kind(),
                    "failed to open sink"
                );
                false
            }
        }
    }

    /// Emit the batch for `timestamp` and apply the sync cadence. The record
    /// is cleared whether or not the emit succeeded. A batch whose samples
    /// were all rejected is not a row.
    fn close_batch(&mut self, timestamp: i64, trigger: &str) -> bool {
        if self.record.is_empty() {
            trace!(timestamp, "closing empty batch without emit");
            return false;
        }
        let emitted = match self.emit_batch(timestamp) {
            Ok(()) => {
                self.stats.rows_emitted += 1;
                if self.stats.rows_emitted % self.sync_every == 0 {
                    self.sync();
                }
                true
            }
            Err(e) => {
                self.stats.sample_failures += 1;
                warn!(metric = %trigger, error = %e, timestamp, "failed to emit batch");
                false
            }
        };
        self.record.clear();
        emitted
    }

    fn emit_batch(&mut self, timestamp: i64) -> Result<()> {
        let Some(stream) = &self.stream else {
            return Err(Error::SinkNotOpen {
                sink: self.sink.kind(),
            });
        };
        let line = serde_json::to_string(&BatchRecord {
            timestamp,
            values: &self.record,
            host: &stream.host,
        })?;
        self.sink.emit(&line)?;
        trace!(timestamp, leaves = self.record.leaf_count(), "batch emitted");
        Ok(())
    }

    fn sync(&mut self) {
        match self.sink.sync() {
            Ok(()) => self.stats.syncs += 1,
            Err(e) => {
                self.stats.sync_failures += 1;
                warn!(error = %e, sink = self.sink.kind(), "durable sync failed");
            }
        }
    }

    fn drop_sample(&mut self, name: &str, reason: DropReason) -> Offer {
        match reason {
            DropReason::ForeignStream => self.stats.dropped_foreign += 1,
            DropReason::SinkUnavailable => self.stats.dropped_sink_unavailable += 1,
            _ => {}
        }
        trace!(metric = %name, ?reason, "sample dropped");
        Offer::Dropped(reason)
    }
}
