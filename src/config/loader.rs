//! Configuration file loading.

use crate::config::{validate_config, ModClusterConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Load configuration from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ModClusterConfig, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents)
}

/// Parse and validate configuration from a YAML string.
///
/// Split out from [`load_config`] for embedders that receive their
/// configuration over a management channel rather than from disk.
pub fn parse_config(contents: &str) -> Result<ModClusterConfig, ConfigError> {
    let config: ModClusterConfig = serde_yaml::from_str(contents)?;
    validate_config(&config).map_err(ConfigError::Invalid)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeType;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_full_config() {
        let yaml = r#"
global:
  log_level: debug
  log_format: pretty

health_check_interval: 5s
remove_broken_nodes: 2m

health_check:
  type: http
  path: /health
  expected_status: 204
  timeout: 1s

failover_cache:
  capacity: 50
  ttl: 2m
"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.global.log_level, "debug");
        assert_eq!(config.health_check_interval, Duration::from_secs(5));
        assert_eq!(config.health_check.check_type, ProbeType::Http);
        assert_eq!(config.health_check.expected_status, 204);
        assert_eq!(config.failover_cache.capacity, 50);
    }

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config.health_check_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let result = load_config("/nonexistent/path/config.yaml");
        match result.unwrap_err() {
            ConfigError::Read { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/path/config.yaml"));
            }
            other => panic!("expected a read error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = parse_config("not: valid: yaml: {{{}}}");
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_parse_rejects_invalid_config() {
        let yaml = r#"
health_check:
  type: http
"#;
        let result = parse_config(yaml);
        assert!(matches!(result.unwrap_err(), ConfigError::Invalid(_)));
    }
}
