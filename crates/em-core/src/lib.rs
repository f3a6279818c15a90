//! Executor metrics reporter core.
//!
//! Turns periodic registry snapshots into one nested JSON record per
//! timestamp and delivers it to a durable log file or a broker topic.
//!
//! Pipeline, leaves first:
//! - [`route`]: dotted metric name → (application, executor, path)
//! - [`record`]: merges (path, value) into the nested per-timestamp record
//! - [`batch`]: owns the open batch, decides flush boundaries, drives sync cadence
//! - [`sink`]: durable-log and publish delivery behind one trait
//! - [`reporter`]: one report cycle over a registry snapshot

pub mod batch;
pub mod clock;
pub mod exit_codes;
pub mod filter;
pub mod logging;
pub mod record;
pub mod registry;
pub mod replay;
pub mod reporter;
pub mod route;
pub mod sink;
pub mod stats;

pub use batch::{BatchScheduler, BatchStats, DropReason, Offer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use filter::{AllMetrics, MetricFilter, RegexFilter};
pub use record::{MergeOutcome, Record, RecordNode};
pub use registry::{MetricKind, MetricsSnapshot};
pub use reporter::{Reporter, ReporterBuilder, ReporterStats};
pub use route::{route, RoutingKey};
pub use sink::{MetricSink, StreamKey};
pub use stats::{MetricValue, Sample, UnitConversion};
