//! Stream identity types.
//!
//! A reporter stream is identified by the (application, executor) pair parsed
//! from metric names, and written under a host tag `<hostname>_<executor>`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Application identifier, e.g. `app-20150917-0001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    /// Required prefix of every routable application id.
    pub const PREFIX: &'static str = "app";

    /// Parse an application id, requiring the `app` prefix.
    pub fn parse(s: &str) -> Option<Self> {
        if s.starts_with(Self::PREFIX) {
            Some(ApplicationId(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Executor identifier.
///
/// Must parse as a 32-bit integer. The original spelling is kept so that
/// file names and host tags reproduce the segment exactly as it appeared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutorId(String);

impl ExecutorId {
    /// Parse and validate an executor id segment.
    pub fn parse(s: &str) -> Option<Self> {
        s.parse::<i32>().ok().map(|_| ExecutorId(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host tag written into every record: `<hostname>_<executor>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostTag(pub String);

impl HostTag {
    pub fn new(hostname: &str, executor: &ExecutorId) -> Self {
        HostTag(format!("{}_{}", hostname, executor))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
