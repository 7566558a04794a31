//! Config environment variable tests
//!
//! These tests verify that Config::from_env() reads and applies environment
//! variable overrides. Config::from_env() also loads a .env file via
//! dotenvy, which never overrides variables already set here.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use research_workflow::config::{Config, LogFormat};
use serial_test::serial;
use std::env;

fn with_api_key() {
    env::set_var("ASSISTANT_API_KEY", "test-key");
}

#[test]
#[serial]
fn test_missing_api_key_is_a_config_error() {
    env::remove_var("ASSISTANT_API_KEY");

    // A developer .env file may provide the key; only assert when it does not.
    if let Err(e) = Config::from_env() {
        assert!(e.to_string().contains("ASSISTANT_API_KEY"));
    }
}

#[test]
#[serial]
fn test_config_from_env_custom_base_url() {
    with_api_key();
    env::set_var("ASSISTANT_BASE_URL", "https://assistant.example.com");

    let config = Config::from_env().unwrap();
    assert_eq!(config.assistant.api_key, "test-key");
    assert_eq!(config.assistant.base_url, "https://assistant.example.com");

    env::remove_var("ASSISTANT_BASE_URL");
}

#[test]
#[serial]
fn test_config_from_env_models() {
    with_api_key();
    env::set_var("MODEL_REPORT", "gpt-report");
    env::set_var("MODEL_EXECUTION", "gpt-exec");

    let config = Config::from_env().unwrap();
    assert_eq!(config.models.report, "gpt-report");
    assert_eq!(config.models.execution, "gpt-exec");

    env::remove_var("MODEL_REPORT");
    env::remove_var("MODEL_EXECUTION");
}

#[test]
#[serial]
fn test_config_from_env_custom_database() {
    with_api_key();
    env::set_var("DATABASE_PATH", "/custom/workflow.db");
    env::set_var("DATABASE_MAX_CONNECTIONS", "10");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.path.to_str().unwrap(), "/custom/workflow.db");
    assert_eq!(config.database.max_connections, 10);

    env::remove_var("DATABASE_PATH");
    env::remove_var("DATABASE_MAX_CONNECTIONS");
}

#[test]
#[serial]
fn test_config_from_env_json_log_format() {
    with_api_key();
    env::set_var("LOG_FORMAT", "JSON");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);

    env::set_var("LOG_FORMAT", "anything-else");
    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Pretty);

    env::remove_var("LOG_FORMAT");
}

#[test]
#[serial]
fn test_config_from_env_custom_request() {
    with_api_key();
    env::set_var("REQUEST_TIMEOUT_MS", "60000");
    env::set_var("MAX_RETRIES", "5");
    env::set_var("RETRY_DELAY_MS", "2000");

    let config = Config::from_env().unwrap();
    assert_eq!(config.request.timeout_ms, 60000);
    assert_eq!(config.request.max_retries, 5);
    assert_eq!(config.request.retry_delay_ms, 2000);

    env::remove_var("REQUEST_TIMEOUT_MS");
    env::remove_var("MAX_RETRIES");
    env::remove_var("RETRY_DELAY_MS");
}

#[test]
#[serial]
fn test_invalid_numbers_fall_back_to_defaults() {
    with_api_key();
    env::set_var("MAX_RETRIES", "lots");
    env::set_var("IMAGE_WIDTH", "-1");

    let config = Config::from_env().unwrap();
    assert_eq!(config.request.max_retries, 3);
    assert_eq!(config.images.width, 600);

    env::remove_var("MAX_RETRIES");
    env::remove_var("IMAGE_WIDTH");
}

#[test]
#[serial]
fn test_config_from_env_images() {
    with_api_key();
    env::set_var("IMAGE_DIR", "/tmp/workflow-images");
    env::set_var("IMAGE_WIDTH", "800");

    let config = Config::from_env().unwrap();
    assert_eq!(config.images.dir.to_str().unwrap(), "/tmp/workflow-images");
    assert_eq!(config.images.width, 800);

    env::remove_var("IMAGE_DIR");
    env::remove_var("IMAGE_WIDTH");
}
