//! Error types for the executor metrics reporter.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for reporter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the executor metrics reporter.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown time unit: {0}")]
    UnknownTimeUnit(String),

    #[error("invalid filter pattern '{pattern}': {reason}")]
    InvalidFilter { pattern: String, reason: String },

    // Sink errors (20-29)
    #[error("failed to open {sink} sink: {reason}")]
    SinkOpen { sink: &'static str, reason: String },

    #[error("{sink} sink used before open")]
    SinkNotOpen { sink: &'static str },

    #[error("broker error: {0}")]
    Broker(String),

    // Replay errors (30-39)
    #[error("malformed replay frame at line {line}: {reason}")]
    ReplayFrame { line: usize, reason: String },

    // I/O errors (60-69)
    #[error("I/O error at {path}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    /// Used for detailed error reporting in JSON output.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::UnknownTimeUnit(_) => 11,
            Error::InvalidFilter { .. } => 12,
            Error::SinkOpen { .. } => 20,
            Error::SinkNotOpen { .. } => 21,
            Error::Broker(_) => 22,
            Error::ReplayFrame { .. } => 30,
            Error::IoAt { .. } => 60,
            Error::Io(_) => 61,
            Error::Json(_) => 62,
        }
    }

    /// Attach a path to an I/O error.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::IoAt {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_grouped_by_category() {
        assert_eq!(Error::Config("x".into()).code(), 10);
        assert_eq!(
            Error::SinkOpen {
                sink: "durable_log",
                reason: "denied".into()
            }
            .code(),
            20
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(Error::io_at("/tmp/x", io).code(), 60);
    }

    #[test]
    fn test_io_at_display_includes_path() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::io_at("/data/app-1", io);
        assert!(err.to_string().contains("/data/app-1"));
    }
}
