//! Exit codes for the em-core CLI.
//!
//! Exit codes communicate operation outcome without requiring output parsing.

use em_common::Error;

/// Exit codes for em-core operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Completed without problems
    Clean = 0,

    /// Completed, but some input lines were skipped
    PartialInput = 1,

    /// Configuration error
    ConfigError = 10,

    /// Sink could not be used
    SinkError = 11,

    /// Replay input error
    InputError = 12,

    /// I/O error
    IoError = 13,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates success.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::PartialInput)
    }

    /// Check if this exit code indicates an error requiring attention.
    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Config(_) | Error::UnknownTimeUnit(_) | Error::InvalidFilter { .. } => {
                ExitCode::ConfigError
            }
            Error::SinkOpen { .. } | Error::SinkNotOpen { .. } | Error::Broker(_) => {
                ExitCode::SinkError
            }
            Error::ReplayFrame { .. } | Error::Json(_) => ExitCode::InputError,
            Error::IoAt { .. } | Error::Io(_) => ExitCode::IoError,
        }
    }
}
