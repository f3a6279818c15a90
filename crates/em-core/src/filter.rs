//! Sampling filter: decides which metrics reach name routing.

use em_common::{Error, Result};
use em_config::{ConfigError, FilterConfig};
use regex::Regex;

use crate::registry::MetricKind;

pub trait MetricFilter: Send + Sync {
    fn matches(&self, name: &str, kind: MetricKind) -> bool;
}

/// Accepts every metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllMetrics;

impl MetricFilter for AllMetrics {
    fn matches(&self, _name: &str, _kind: MetricKind) -> bool {
        true
    }
}

impl<F> MetricFilter for F
where
    F: Fn(&str, MetricKind) -> bool + Send + Sync,
{
    fn matches(&self, name: &str, kind: MetricKind) -> bool {
        self(name, kind)
    }
}

/// Include/exclude regex filter on metric names.
#[derive(Debug, Clone, Default)]
pub struct RegexFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl RegexFilter {
    pub fn new(include: Vec<Regex>, exclude: Vec<Regex>) -> Self {
        Self { include, exclude }
    }

    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let (include, exclude) = config.compile().map_err(|e| match e {
            ConfigError::InvalidPattern { pattern, source } => Error::InvalidFilter {
                pattern,
                reason: source.to_string(),
            },
            other => Error::Config(other.to_string()),
        })?;
        Ok(Self::new(include, exclude))
    }
}

impl MetricFilter for RegexFilter {
    fn matches(&self, name: &str, _kind: MetricKind) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|r| r.is_match(name));
        included && !self.exclude.iter().any(|r| r.is_match(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics() {
        assert!(AllMetrics.matches("anything", MetricKind::Gauge));
    }

    #[test]
    fn test_closure_filter_sees_kind() {
        let only_counters = |_: &str, kind: MetricKind| kind == MetricKind::Counter;
        assert!(only_counters.matches("x", MetricKind::Counter));
        assert!(!only_counters.matches("x", MetricKind::Timer));
    }

    #[test]
    fn test_regex_include_exclude() {
        let filter = RegexFilter::from_config(&FilterConfig {
            include: vec![r"\.jvm\.".to_string()],
            exclude: vec![r"\.gc\.".to_string()],
        })
        .unwrap();
        assert!(filter.matches("app-1.3.executor.jvm.heap", MetricKind::Gauge));
        assert!(!filter.matches("app-1.3.executor.jvm.gc.time", MetricKind::Gauge));
        assert!(!filter.matches("app-1.3.executor.threadpool", MetricKind::Gauge));
    }

    #[test]
    fn test_empty_regex_filter_accepts_all() {
        let filter = RegexFilter::from_config(&FilterConfig::default()).unwrap();
        assert!(filter.matches("notapp.x", MetricKind::Meter));
    }

    #[test]
    fn test_invalid_pattern_names_the_pattern() {
        let err = RegexFilter::from_config(&FilterConfig {
            include: vec!["ok".to_string(), "(bad".to_string()],
            exclude: vec![],
        })
        .unwrap_err();
        match err {
            Error::InvalidFilter { pattern, .. } => assert_eq!(pattern, "(bad"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
