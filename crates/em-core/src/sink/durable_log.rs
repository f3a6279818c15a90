//! Append-only newline-delimited JSON file per (application, executor).
//!
//! Layout: `<directory>/<application>/<hostname>_<executor>.json`.

use em_common::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{MetricSink, StreamKey};

const SINK_KIND: &str = "durable_log";
const FILE_EXTENSION: &str = "json";

#[derive(Debug)]
struct OpenLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl OpenLog {
    /// Drop bytes still buffered so a partly written line never reaches the file.
    fn discard_buffered(self) -> Self {
        let (file, _unwritten) = self.writer.into_parts();
        Self {
            path: self.path,
            writer: BufWriter::new(file),
        }
    }
}

/// Durable log sink.
#[derive(Debug)]
pub struct DurableLogSink {
    directory: PathBuf,
    log: Option<OpenLog>,
}

impl DurableLogSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            log: None,
        }
    }

    /// File a stream is written to.
    pub fn log_path(directory: &Path, stream: &StreamKey) -> PathBuf {
        directory
            .join(stream.application_id.as_str())
            .join(format!("{}.{}", stream.host, FILE_EXTENSION))
    }

    /// Path of the open file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.log.as_ref().map(|l| l.path.as_path())
    }

    fn open_log(&mut self) -> Result<&mut OpenLog> {
        self.log
            .as_mut()
            .ok_or(Error::SinkNotOpen { sink: SINK_KIND })
    }
}

impl MetricSink for DurableLogSink {
    fn kind(&self) -> &'static str {
        SINK_KIND
    }

    fn open(&mut self, stream: &StreamKey) -> Result<()> {
        let path = Self::log_path(&self.directory, stream);
        if self.path() == Some(path.as_path()) {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io_at(&path, e))?;

        info!(path = %path.display(), "durable log opened");
        self.log = Some(OpenLog {
            path,
            writer: BufWriter::new(file),
        });
        Ok(())
    }

    fn emit(&mut self, record: &str) -> Result<()> {
        let mut line = String::with_capacity(record.len() + 1);
        line.push_str(record);
        line.push('\n');

        let log = self.open_log()?;
        let Err(e) = log.writer.write_all(line.as_bytes()) else {
            return Ok(());
        };
        let path = log.path.clone();
        self.log = self.log.take().map(OpenLog::discard_buffered);
        Err(Error::io_at(path, e))
    }

    fn sync(&mut self) -> Result<()> {
        let log = self.open_log()?;
        log.writer.flush().map_err(|e| Error::io_at(&log.path, e))?;
        log.writer
            .get_ref()
            .sync_all()
            .map_err(|e| Error::io_at(&log.path, e))?;
        debug!(path = %log.path.display(), "durable log synced");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.log.is_none() {
            return Ok(());
        }
        let result = self.sync();
        if let Some(log) = self.log.take() {
            info!(path = %log.path.display(), "durable log closed");
        }
        result
    }
}
