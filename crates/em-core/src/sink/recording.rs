//! Sink that records every call, for tests and embedding diagnostics.

use em_common::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{MetricSink, StreamKey};

const SINK_KIND: &str = "recording";

/// One call observed by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Open {
        application_id: String,
        executor_id: String,
        host: String,
    },
    Emit(String),
    Sync,
    Close,
}

#[derive(Debug, Default)]
struct Log {
    calls: Vec<SinkCall>,
    fail_opens: usize,
    fail_emits: usize,
}

/// Records calls into shared state; clones observe the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<Log>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail_next_opens(&self, n: usize) {
        self.log().fail_opens = n;
    }

    pub fn fail_next_emits(&self, n: usize) {
        self.log().fail_emits = n;
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.log().calls.clone()
    }

    /// Records passed to `emit`, in order.
    pub fn emitted(&self) -> Vec<String> {
        self.log()
            .calls
            .iter()
            .filter_map(|c| match c {
                SinkCall::Emit(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &SinkCall) -> usize {
        self.log().calls.iter().filter(|c| *c == call).count()
    }

    pub fn open_count(&self) -> usize {
        self.log()
            .calls
            .iter()
            .filter(|c| matches!(c, SinkCall::Open { .. }))
            .count()
    }
}

impl MetricSink for RecordingSink {
    fn kind(&self) -> &'static str {
        SINK_KIND
    }

    fn open(&mut self, stream: &StreamKey) -> Result<()> {
        let mut log = self.log();
        if log.fail_opens > 0 {
            log.fail_opens -= 1;
            return Err(Error::SinkOpen {
                sink: SINK_KIND,
                reason: "open refused".to_string(),
            });
        }
        log.calls.push(SinkCall::Open {
            application_id: stream.application_id.to_string(),
            executor_id: stream.executor_id.to_string(),
            host: stream.host.to_string(),
        });
        Ok(())
    }

    fn emit(&mut self, record: &str) -> Result<()> {
        let mut log = self.log();
        if log.fail_emits > 0 {
            log.fail_emits -= 1;
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "emit refused",
            )));
        }
        log.calls.push(SinkCall::Emit(record.to_string()));
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.log().calls.push(SinkCall::Sync);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.log().calls.push(SinkCall::Close);
        Ok(())
    }
}
