//! Table-driven tests for configuration loading and validation.

mod common;

use common::{ConfigBuilder, TestHarness};

use scriptsmith::config::{load_config, load_config_from_str, Browser};

struct ConfigTestCase {
    name: &'static str,
    config_json: &'static str,
    should_succeed: bool,
    /// Expected error substring when loading fails.
    expected_error: Option<&'static str>,
}

const JSON_CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal",
        config_json: r#"{ "version": "1.0" }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_full",
        config_json: r#"{
            "version": "1.0",
            "database_path": "/var/lib/scriptsmith/scriptsmith.db",
            "worker_count": 4,
            "default_browser": "firefox",
            "generation": {
                "endpoint": "http://localhost:8080/v1/chat/completions",
                "model": "local-model",
                "api_key_env": "LOCAL_KEY",
                "request_timeout_secs": 30,
                "temperature": 0.0
            },
            "executor": { "interpreter": "python3", "timeout_secs": 60, "headless": true },
            "archive": { "max_entries": 500, "max_total_bytes": 10485760, "max_file_bytes": 1048576 },
            "task_retention_hours": 48,
            "log": { "level": "debug", "json": true }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "missing_version",
        config_json: r#"{ "worker_count": 2 }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unknown_browser",
        config_json: r#"{ "version": "1.0", "default_browser": "edge" }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "zero_workers",
        config_json: r#"{ "version": "1.0", "worker_count": 0 }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unknown_log_level",
        config_json: r#"{ "version": "1.0", "log": { "level": "verbose" } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unsupported_version",
        config_json: r#"{ "version": "2.0" }"#,
        should_succeed: false,
        expected_error: Some("Unsupported config version"),
    },
    ConfigTestCase {
        name: "file_limit_exceeds_total",
        config_json: r#"{
            "version": "1.0",
            "archive": { "max_total_bytes": 100, "max_file_bytes": 1000 }
        }"#,
        should_succeed: false,
        expected_error: Some("max_file_bytes"),
    },
    ConfigTestCase {
        name: "non_http_endpoint",
        config_json: r#"{ "version": "1.0", "generation": { "endpoint": "ftp://example.com" } }"#,
        should_succeed: false,
        expected_error: Some("generation.endpoint"),
    },
    ConfigTestCase {
        name: "invalid_json",
        config_json: r#"{ "version": "1.0", "#,
        should_succeed: false,
        expected_error: Some("Failed to parse config JSON"),
    },
];

#[test]
fn test_json_config_loading() {
    for test_case in JSON_CONFIG_TESTS {
        let result = load_config_from_str(test_case.config_json);

        if test_case.should_succeed {
            assert!(
                result.is_ok(),
                "Test '{}': Expected success but got error: {:?}",
                test_case.name,
                result.err()
            );
        } else {
            assert!(
                result.is_err(),
                "Test '{}': Expected error but got success",
                test_case.name
            );

            if let Some(expected_error) = test_case.expected_error {
                let error_msg = result.err().unwrap().to_string();
                assert!(
                    error_msg.contains(expected_error),
                    "Test '{}': Expected error containing '{}', got '{}'",
                    test_case.name,
                    expected_error,
                    error_msg
                );
            }
        }
    }
}

#[test]
fn test_written_config_round_trips_through_file() {
    let h = TestHarness::new();
    let config = ConfigBuilder::new()
        .database_path(h.db_path().to_str().unwrap())
        .worker_count(3)
        .default_browser(Browser::Webkit)
        .task_retention_hours(6)
        .build();

    let path = h.db_path().with_file_name("config.json");
    std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

    let loaded = load_config(&path).unwrap();
    assert_eq!(loaded.worker_count, 3);
    assert_eq!(loaded.default_browser, Browser::Webkit);
    assert_eq!(loaded.task_retention_hours, 6);
    assert_eq!(loaded.resolved_database_path(), Some(h.db_path()));

    h.shutdown();
}
