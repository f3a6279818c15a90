//! Name routing: `<app>.<executor>.<kind-marker>.<path...>`.
//!
//! Names outside this scheme are expected and frequent; they are "not
//! routable", never an error.

use em_common::{ApplicationId, ExecutorId};

/// Segments before the metric path: application, executor, and a discarded
/// routing level.
const PATH_OFFSET: usize = 3;

/// Routing key parsed from a metric name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingKey {
    pub application_id: ApplicationId,
    pub executor_id: ExecutorId,
    pub path: Vec<String>,
}

impl RoutingKey {
    /// Whether two keys address the same (application, executor) stream.
    pub fn same_stream(&self, other_app: &ApplicationId, other_exec: &ExecutorId) -> bool {
        &self.application_id == other_app && &self.executor_id == other_exec
    }
}

/// Parse a dotted metric name.
///
/// Trailing empty segments are dropped (`"a.b."` has two segments); empty
/// segments in the middle are kept.
pub fn route(name: &str) -> Option<RoutingKey> {
    let mut segments: Vec<&str> = name.split('.').collect();
    while segments.len() > 1 && segments.last().is_some_and(|s| s.is_empty()) {
        segments.pop();
    }

    let application_id = ApplicationId::parse(segments.first()?)?;
    let executor_id = ExecutorId::parse(segments.get(1)?)?;
    let path = segments
        .iter()
        .skip(PATH_OFFSET)
        .map(|s| s.to_string())
        .collect();

    Some(RoutingKey {
        application_id,
        executor_id,
        path,
    })
}
