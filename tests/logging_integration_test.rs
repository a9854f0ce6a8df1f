//! Integration tests for logging functionality
//!
//! A global subscriber can be installed once per process, so only
//! `test_file_logging` initializes one.

use tablift::config::LoggingConfig;
use tablift::logging::init_logging;
use tempfile::TempDir;

#[test]
fn test_logging_config_default() {
    let config = LoggingConfig::default();
    assert!(!config.local_enabled);
    assert_eq!(config.local_rotation, "daily");
    assert!(!config.json);
}

#[test]
fn test_invalid_level_is_rejected() {
    let result = init_logging("loud", &LoggingConfig::default());
    assert!(result.is_err());
    if let Err(e) = result {
        assert!(e.to_string().contains("Invalid log level"));
    }
}

#[test]
fn test_file_logging() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("logs");

    let config = LoggingConfig {
        local_enabled: true,
        local_path: log_path.to_string_lossy().to_string(),
        local_rotation: "never".to_string(),
        json: false,
    };

    let guard = init_logging("debug", &config).expect("Failed to initialize logging");
    assert!(log_path.exists());

    tablift::log_retry_attempt!("get_row_count", 2, 3, 2000u64, "Connection timeout");
    tablift::log_entity_outcome!("load", "billing", "invoices", "created");
    drop(guard);

    let written: Vec<_> = std::fs::read_dir(&log_path).unwrap().collect();
    assert!(!written.is_empty());
}
