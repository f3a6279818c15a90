//! Config resolution: explicit path → `EM_CONFIG` → XDG config dir → defaults.

use crate::reporter::{ConfigError, ReporterConfig};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming a config file.
pub const ENV_CONFIG: &str = "EM_CONFIG";

const CONFIG_DIR_NAME: &str = "execmetrics";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Where the resolved configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Env(PathBuf),
    ConfigDir(PathBuf),
    Defaults,
}

/// A validated configuration plus its provenance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: ReporterConfig,
    pub source: ConfigSource,
}

/// Resolve the configuration from the process environment.
pub fn resolve_config(explicit: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
    let env_path = std::env::var_os(ENV_CONFIG).map(PathBuf::from);
    let config_dir = dirs::config_dir();
    resolve_config_with(explicit, env_path.as_deref(), config_dir.as_deref())
}

/// Resolve the configuration from explicit inputs.
///
/// An explicit or env path must exist; the config-dir file is optional.
pub fn resolve_config_with(
    explicit: Option<&Path>,
    env_path: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<ResolvedConfig, ConfigError> {
    let (config, source) = if let Some(path) = explicit {
        (load_from_path(path)?, ConfigSource::Explicit(path.to_path_buf()))
    } else if let Some(path) = env_path {
        (load_from_path(path)?, ConfigSource::Env(path.to_path_buf()))
    } else {
        let candidate = config_dir.map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
        match candidate {
            Some(path) if path.is_file() => {
                (load_from_path(&path)?, ConfigSource::ConfigDir(path))
            }
            _ => (ReporterConfig::default(), ConfigSource::Defaults),
        }
    };

    config.validate()?;
    Ok(ResolvedConfig { config, source })
}

/// Load a config file; `.json` files are parsed as JSON, anything else as TOML.
pub fn load_from_path(path: &Path) -> Result<ReporterConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    } else {
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::SinkConfig;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_when_nothing_configured() {
        let tmp = TempDir::new().unwrap();
        let resolved = resolve_config_with(None, None, Some(tmp.path())).unwrap();
        assert_eq!(resolved.source, ConfigSource::Defaults);
        assert_eq!(resolved.config.sync_every, 20);
    }

    #[test]
    fn test_explicit_wins_over_env() {
        let tmp = TempDir::new().unwrap();
        let explicit = write(tmp.path(), "a.toml", "sync_every = 7\n");
        let env = write(tmp.path(), "b.toml", "sync_every = 9\n");
        let resolved = resolve_config_with(Some(&explicit), Some(&env), None).unwrap();
        assert_eq!(resolved.config.sync_every, 7);
        assert_eq!(resolved.source, ConfigSource::Explicit(explicit));
    }

    #[test]
    fn test_env_path_used_when_no_explicit() {
        let tmp = TempDir::new().unwrap();
        let env = write(tmp.path(), "env.json", r#"{"sync_every": 3}"#);
        let resolved = resolve_config_with(None, Some(&env), None).unwrap();
        assert_eq!(resolved.config.sync_every, 3);
        assert!(matches!(resolved.source, ConfigSource::Env(_)));
    }

    #[test]
    fn test_config_dir_file_is_picked_up() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join(CONFIG_DIR_NAME);
        fs::create_dir_all(&dir).unwrap();
        write(
            &dir,
            CONFIG_FILE_NAME,
            "[sink]\nkind = \"publish\"\nhost = \"broker\"\nport = 1884\n",
        );
        let resolved = resolve_config_with(None, None, Some(tmp.path())).unwrap();
        assert!(matches!(resolved.source, ConfigSource::ConfigDir(_)));
        assert_eq!(
            resolved.config.sink,
            SinkConfig::Publish {
                host: "broker".to_string(),
                port: 1884
            }
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");
        let err = resolve_config_with(Some(&missing), None, None).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_invalid_config_fails_validation() {
        let tmp = TempDir::new().unwrap();
        let path = write(tmp.path(), "bad.toml", "sync_every = 0\n");
        let err = resolve_config_with(Some(&path), None, None).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_malformed_toml_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = write(tmp.path(), "broken.toml", "sync_every = [");
        let err = load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }
}
