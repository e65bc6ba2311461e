use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    if config.archive.max_file_bytes > config.archive.max_total_bytes {
        return Err(ConfigError::Validation {
            message: format!(
                "archive.max_file_bytes ({}) exceeds archive.max_total_bytes ({})",
                config.archive.max_file_bytes, config.archive.max_total_bytes
            ),
        });
    }

    if !config.generation.endpoint.starts_with("http://")
        && !config.generation.endpoint.starts_with("https://")
    {
        return Err(ConfigError::Validation {
            message: format!(
                "generation.endpoint must be an http(s) URL: {}",
                config.generation.endpoint
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Browser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn minimal_config_json() -> &'static str {
        r#"{
            "version": "1.0",
            "database_path": "/tmp/scriptsmith-test.db",
            "worker_count": 2,
            "default_browser": "firefox"
        }"#
    }

    #[test]
    fn test_load_minimal_config() {
        let config = load_config_from_str(minimal_config_json()).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.default_browser, Browser::Firefox);
        assert_eq!(
            config.database_path.as_deref(),
            Some("/tmp/scriptsmith-test.db")
        );
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", minimal_config_json()).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.worker_count, 2);
    }

    #[test]
    fn test_missing_file_error() {
        let result = load_config("/nonexistent/scriptsmith.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_invalid_json() {
        let result = load_config_from_str("{ not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_schema_rejects_unknown_browser() {
        let json = r#"{"version": "1.0", "default_browser": "netscape"}"#;
        let result = load_config_from_str(json);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_schema_rejects_unknown_field() {
        let json = r#"{"version": "1.0", "colour": "blue"}"#;
        let result = load_config_from_str(json);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_unsupported_version() {
        let json = r#"{"version": "2.0"}"#;
        match load_config_from_str(json) {
            Err(ConfigError::Validation { message }) => {
                assert!(message.contains("Unsupported config version"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_file_limit_larger_than_total_limit() {
        let json = r#"{
            "version": "1.0",
            "archive": { "max_total_bytes": 100, "max_file_bytes": 200 }
        }"#;
        match load_config_from_str(json) {
            Err(ConfigError::Validation { message }) => {
                assert!(message.contains("max_file_bytes"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_http_endpoint_rejected() {
        let json = r#"{"version": "1.0", "generation": {"endpoint": "ftp://example.com"}}"#;
        assert!(matches!(
            load_config_from_str(json),
            Err(ConfigError::Validation { .. })
        ));
    }
}
