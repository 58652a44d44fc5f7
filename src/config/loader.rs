//! Configuration file loading
//!
//! The proxy is normally configured entirely through CLI flags, but a JSON
//! file can supply the same fields for service deployments. CLI flags
//! override file values; environment variables override the log level.

use std::path::Path;

use tracing::debug;

use super::types::ProxyConfig;
use crate::error::ConfigError;

/// Load configuration from a JSON file
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: impl AsRef<Path>) -> Result<ProxyConfig, ConfigError> {
    let path = path.as_ref();

    debug!("Loading configuration from {:?}", path);

    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let contents = std::fs::read_to_string(path)?;
    let config = load_config_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("{e} at {path:?}")))?;

    Ok(config)
}

/// Load configuration from a JSON string
///
/// # Errors
///
/// Returns `ConfigError` if parsing or validation fails.
pub fn load_config_str(json: &str) -> Result<ProxyConfig, ConfigError> {
    let mut config: ProxyConfig =
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    // MULTIFLOW_LOG_LEVEL overrides the file; RUST_LOG still wins at
    // subscriber level.
    if let Ok(level) = std::env::var("MULTIFLOW_LOG_LEVEL") {
        config.log_level = level;
        debug!("Log level overridden to {}", config.log_level);
    }

    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/multiflow.json");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"port": 9443, "use_https": false, "workers": 2}"#)
            .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.port, 9443);
        assert_eq!(config.workers, 2);
        // Unspecified fields come from defaults
        assert_eq!(config.buffer_size, 16384);
    }

    #[test]
    fn test_load_config_invalid_json() {
        let result = load_config_str("{not json");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let result = load_config_str(r#"{"port": 0}"#);
        assert!(matches!(result, Err(ConfigError::InvalidPort(0))));

        let result = load_config_str(r#"{"workers": 0}"#);
        assert!(matches!(result, Err(ConfigError::InvalidWorkers(0))));
    }

    #[test]
    fn test_load_config_ssh_only() {
        let config = load_config_str(r#"{"ssh_only": true, "ssh_port": 2222}"#).unwrap();
        assert!(config.ssh_only);
        assert_eq!(config.ssh_port, 2222);
    }
}
