//! Reporter configuration types.

use em_common::TimeUnit;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Emitted records between forced durable syncs.
pub const DEFAULT_SYNC_EVERY: u64 = 20;

/// Default broker port for the publish sink.
pub const DEFAULT_BROKER_PORT: u16 = 1883;

const DATA_DIR_NAME: &str = "execmetrics";

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse JSON config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("invalid filter pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Where closed batches are delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    /// Append-only newline-delimited JSON files under `directory`.
    DurableLog { directory: PathBuf },
    /// One message per batch on topic `metrics-<application>`.
    Publish {
        host: String,
        #[serde(default = "default_broker_port")]
        port: u16,
    },
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::DurableLog {
            directory: default_data_dir(),
        }
    }
}

impl SinkConfig {
    pub fn kind_name(&self) -> &'static str {
        match self {
            SinkConfig::DurableLog { .. } => "durable_log",
            SinkConfig::Publish { .. } => "publish",
        }
    }
}

/// Which value of a metric is written into the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValueMode {
    /// The first field of each kind: gauge value, otherwise the count.
    #[default]
    Primary,
    /// The full statistics bundle for histograms, meters and timers.
    Statistics,
}

/// Sampling filter applied before name routing.
///
/// A metric passes when it matches at least one `include` pattern (or the
/// list is empty) and no `exclude` pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FilterConfig {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl FilterConfig {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Compile include and exclude patterns.
    pub fn compile(&self) -> Result<(Vec<Regex>, Vec<Regex>), ConfigError> {
        Ok((compile_all(&self.include)?, compile_all(&self.exclude)?))
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|source| ConfigError::InvalidPattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

/// Complete reporter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReporterConfig {
    #[serde(default)]
    pub sink: SinkConfig,

    /// Unit rates are converted to.
    #[serde(default = "default_rate_unit")]
    pub rate_unit: TimeUnit,

    /// Unit timer durations are converted to.
    #[serde(default = "default_duration_unit")]
    pub duration_unit: TimeUnit,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub value_mode: ValueMode,

    /// Force a durable sync after every N emitted records.
    #[serde(default = "default_sync_every")]
    pub sync_every: u64,

    /// Hostname used in host tags and file names. Detected when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            sink: SinkConfig::default(),
            rate_unit: default_rate_unit(),
            duration_unit: default_duration_unit(),
            filter: FilterConfig::default(),
            value_mode: ValueMode::default(),
            sync_every: DEFAULT_SYNC_EVERY,
            hostname: None,
        }
    }
}

impl ReporterConfig {
    /// Check semantic constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.sink {
            SinkConfig::DurableLog { directory } => {
                if directory.as_os_str().is_empty() {
                    return Err(ConfigError::Invalid {
                        field: "sink.directory",
                        reason: "must not be empty".to_string(),
                    });
                }
            }
            SinkConfig::Publish { host, port } => {
                if host.trim().is_empty() {
                    return Err(ConfigError::Invalid {
                        field: "sink.host",
                        reason: "must not be empty".to_string(),
                    });
                }
                if *port == 0 {
                    return Err(ConfigError::Invalid {
                        field: "sink.port",
                        reason: "must be non-zero".to_string(),
                    });
                }
            }
        }

        if self.sync_every == 0 {
            return Err(ConfigError::Invalid {
                field: "sync_every",
                reason: "must be at least 1".to_string(),
            });
        }

        if let Some(hostname) = &self.hostname {
            if hostname.trim().is_empty() || hostname.contains('/') {
                return Err(ConfigError::Invalid {
                    field: "hostname",
                    reason: format!("'{}' is not usable in a file name", hostname),
                });
            }
        }

        self.filter.compile()?;
        Ok(())
    }

    /// Configured hostname, or the machine hostname, or `localhost`.
    pub fn resolved_hostname(&self) -> String {
        if let Some(hostname) = &self.hostname {
            return hostname.clone();
        }
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string())
    }
}

fn default_rate_unit() -> TimeUnit {
    TimeUnit::Seconds
}

fn default_duration_unit() -> TimeUnit {
    TimeUnit::Milliseconds
}

fn default_sync_every() -> u64 {
    DEFAULT_SYNC_EVERY
}

fn default_broker_port() -> u16 {
    DEFAULT_BROKER_PORT
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(DATA_DIR_NAME).join("metrics"))
        .unwrap_or_else(|| PathBuf::from("metrics"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReporterConfig::default();
        assert_eq!(config.rate_unit, TimeUnit::Seconds);
        assert_eq!(config.duration_unit, TimeUnit::Milliseconds);
        assert_eq!(config.sync_every, 20);
        assert_eq!(config.value_mode, ValueMode::Primary);
        assert!(config.validate().is_ok());
        assert_eq!(config.sink.kind_name(), "durable_log");
    }

    #[test]
    fn test_publish_kind_name_matches_serde_tag() {
        let sink = SinkConfig::Publish {
            host: "broker".to_string(),
            port: DEFAULT_BROKER_PORT,
        };
        let json = serde_json::to_value(&sink).unwrap();
        assert_eq!(json["kind"], sink.kind_name());
    }

    #[test]
    fn test_parse_publish_sink_with_default_port() {
        let config: ReporterConfig = toml::from_str(
            r#"
            [sink]
            kind = "publish"
            host = "master.local"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.sink,
            SinkConfig::Publish {
                host: "master.local".to_string(),
                port: DEFAULT_BROKER_PORT,
            }
        );
    }

    #[test]
    fn test_parse_durable_log_and_units() {
        let config: ReporterConfig = toml::from_str(
            r#"
            rate_unit = "minutes"
            duration_unit = "microseconds"
            value_mode = "statistics"
            sync_every = 5

            [sink]
            kind = "durable_log"
            directory = "/var/lib/metrics"

            [filter]
            include = ["^app-"]
            "#,
        )
        .unwrap();
        assert_eq!(config.rate_unit, TimeUnit::Minutes);
        assert_eq!(config.duration_unit, TimeUnit::Microseconds);
        assert_eq!(config.value_mode, ValueMode::Statistics);
        assert_eq!(config.sync_every, 5);
        assert_eq!(config.filter.include, vec!["^app-".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_sync_every() {
        let config = ReporterConfig {
            sync_every: 0,
            ..ReporterConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "sync_every", .. }));
    }

    #[test]
    fn test_validate_rejects_bad_publish_target() {
        let config = ReporterConfig {
            sink: SinkConfig::Publish {
                host: " ".to_string(),
                port: 1883,
            },
            ..ReporterConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ReporterConfig {
            sink: SinkConfig::Publish {
                host: "broker".to_string(),
                port: 0,
            },
            ..ReporterConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "sink.port", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let config = ReporterConfig {
            filter: FilterConfig {
                include: vec!["(unclosed".to_string()],
                exclude: vec![],
            },
            ..ReporterConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_hostname_override() {
        let config = ReporterConfig {
            hostname: Some("worker-7".to_string()),
            ..ReporterConfig::default()
        };
        assert_eq!(config.resolved_hostname(), "worker-7");
        assert!(!ReporterConfig::default().resolved_hostname().is_empty());
    }
}
