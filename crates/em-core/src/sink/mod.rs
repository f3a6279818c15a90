//! Record delivery.
//!
//! Every backend implements [`MetricSink`]; the batch scheduler owns the
//! cadence (when to emit, when to force a sync) and each sink owns what
//! "durable" means for it.

pub mod durable_log;
pub mod mqtt;
pub mod publish;
pub mod recording;

pub use durable_log::DurableLogSink;
pub use mqtt::MqttConnector;
pub use publish::{
    BrokerClient, BrokerConnector, ConnectOptions, InMemoryBroker, PublishSink, PublishedMessage,
    QoS,
};
pub use recording::{RecordingSink, SinkCall};

use em_common::{ApplicationId, ExecutorId, HostTag, Result};

/// The single (application, executor) stream a reporter writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamKey {
    pub application_id: ApplicationId,
    pub executor_id: ExecutorId,
    pub hostname: String,
    pub host: HostTag,
}

impl StreamKey {
    pub fn new(application_id: ApplicationId, executor_id: ExecutorId, hostname: &str) -> Self {
        let host = HostTag::new(hostname, &executor_id);
        Self {
            application_id,
            executor_id,
            hostname: hostname.to_string(),
            host,
        }
    }
}

/// Capability interface shared by all sinks.
pub trait MetricSink: Send {
    /// Short backend name for logs.
    fn kind(&self) -> &'static str;

    /// Acquire the stream's resource. Called once, lazily, on the first
    /// routed sample.
    fn open(&mut self, stream: &StreamKey) -> Result<()>;

    /// Deliver one serialized record (no trailing newline).
    fn emit(&mut self, record: &str) -> Result<()>;

    /// Force previously emitted records to survive a crash.
    fn sync(&mut self) -> Result<()>;

    /// Release the resource. The caller has already emitted any pending batch.
    fn close(&mut self) -> Result<()>;
}

impl<T: MetricSink + ?Sized> MetricSink for Box<T> {
    fn kind(&self) -> &'static str {
        (**self).kind()
    }

    fn open(&mut self, stream: &StreamKey) -> Result<()> {
        (**self).open(stream)
    }

    fn emit(&mut self, record: &str) -> Result<()> {
        (**self).emit(record)
    }

    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
