//! Executor metrics reporter configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for the reporter configuration file
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation
//! - JSON Schema export

pub mod reporter;
pub mod resolve;

pub use reporter::{
    ConfigError, FilterConfig, ReporterConfig, SinkConfig, ValueMode, DEFAULT_BROKER_PORT,
    DEFAULT_SYNC_EVERY,
};
pub use resolve::{load_from_path, resolve_config, resolve_config_with, ConfigSource, ResolvedConfig};

/// JSON Schema for [`ReporterConfig`], as a JSON value.
pub fn config_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(ReporterConfig);
    serde_json::to_value(&schema).unwrap_or(serde_json::Value::Null)
}
