use std::env;
use std::io::Write;
use std::time::Duration;

use ferrous_nest::{AppConfig, DiError, DuplicatePolicy, ScopePolicy};
use serial_test::serial;

const VARS: &[&str] = &[
    "FERROUS_NEST_DEVELOPMENT",
    "FERROUS_NEST_GLOBAL_PREFIX",
    "FERROUS_NEST_REQUEST_TIMEOUT_MS",
    "FERROUS_NEST_DUPLICATE_PROVIDERS",
    "FERROUS_NEST_SCOPE_VIOLATIONS",
    "FERROUS_NEST_EAGER_SINGLETONS",
    "FERROUS_NEST_LOG_LEVEL",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn environment_overrides_defaults() {
    clear_env();
    env::set_var("FERROUS_NEST_DEVELOPMENT", "true");
    env::set_var("FERROUS_NEST_GLOBAL_PREFIX", "api");
    env::set_var("FERROUS_NEST_REQUEST_TIMEOUT_MS", "2500");
    env::set_var("FERROUS_NEST_DUPLICATE_PROVIDERS", "ERROR");
    env::set_var("FERROUS_NEST_SCOPE_VIOLATIONS", "warn");
    env::set_var("FERROUS_NEST_EAGER_SINGLETONS", "off");
    env::set_var("FERROUS_NEST_LOG_LEVEL", "debug");

    let config = AppConfig::from_env().unwrap();
    clear_env();

    assert!(config.development);
    assert_eq!(config.global_prefix.as_deref(), Some("api"));
    assert_eq!(config.request_timeout(), Some(Duration::from_millis(2500)));
    assert_eq!(config.duplicate_providers, DuplicatePolicy::Error);
    assert_eq!(config.scope_violations, ScopePolicy::Warn);
    assert!(!config.eager_singletons);
    assert_eq!(config.log_level, "debug");
}

#[test]
#[serial]
fn unset_environment_keeps_file_values() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{ "global_prefix": "v2", "request_timeout_ms": 100 }}"#).unwrap();

    let config = AppConfig::from_file(file.path())
        .unwrap()
        .with_env_overrides()
        .unwrap();
    assert_eq!(config.global_prefix.as_deref(), Some("v2"));
    assert_eq!(config.request_timeout(), Some(Duration::from_millis(100)));
    assert_eq!(config.scope_violations, ScopePolicy::Deny);

    env::set_var("FERROUS_NEST_GLOBAL_PREFIX", "");
    let config = AppConfig::from_file(file.path())
        .unwrap()
        .with_env_overrides()
        .unwrap();
    clear_env();
    assert_eq!(config.global_prefix, None);
}

#[test]
#[serial]
fn malformed_environment_value_is_a_config_error() {
    clear_env();
    env::set_var("FERROUS_NEST_REQUEST_TIMEOUT_MS", "soon");
    let err = AppConfig::from_env().unwrap_err();
    clear_env();
    assert!(matches!(err, DiError::Config(ref msg) if msg.contains("FERROUS_NEST_REQUEST_TIMEOUT_MS")));
}

#[test]
fn missing_file_is_a_config_error() {
    let err = AppConfig::from_file("/definitely/not/here.json").unwrap_err();
    assert!(matches!(err, DiError::Config(_)));
}
