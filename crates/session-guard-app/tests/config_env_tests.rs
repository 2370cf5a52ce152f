//! Integration tests for environment configuration.

use std::collections::HashMap;
use std::time::Duration;

use session_guard_app::{
    ConfigError, ENV_PROVIDER_URL, ENV_REARM_THRESHOLD_MS, ENV_STORAGE_NAMESPACE,
    ENV_TICK_INTERVAL_MS, ENV_WARNING_THRESHOLD_MS, SessionGuardConfig,
};
use session_guard_monitor::{MonitorConfig, WarningConfig};

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let values: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    move |key: &str| values.get(key).cloned()
}

#[test]
fn config_env_tests_defaults_when_unset() {
    let config = SessionGuardConfig::from_lookup(lookup(&[])).expect("defaults are valid");
    assert_eq!(config, SessionGuardConfig::default());
    assert_eq!(config.monitor, MonitorConfig::default());
    assert_eq!(config.warning, WarningConfig::default());
}

#[test]
fn config_env_tests_reads_every_variable() {
    let config = SessionGuardConfig::from_lookup(lookup(&[
        (ENV_PROVIDER_URL, "https://id.example.test/v1"),
        (ENV_STORAGE_NAMESPACE, "tenant-a"),
        (ENV_TICK_INTERVAL_MS, "500"),
        (ENV_WARNING_THRESHOLD_MS, "120000"),
        (ENV_REARM_THRESHOLD_MS, "90000"),
    ]))
    .expect("config should load");

    assert_eq!(
        config.provider_url.as_ref().map(|url| url.as_str()),
        Some("https://id.example.test/v1/")
    );
    assert_eq!(config.storage_namespace.as_deref(), Some("tenant-a"));
    assert_eq!(config.monitor.tick_interval(), Duration::from_millis(500));
    assert_eq!(config.monitor.warning_threshold(), Duration::from_millis(120_000));
    assert_eq!(config.warning.rearm_threshold(), Duration::from_millis(90_000));
}

#[test]
fn config_env_tests_rejects_bad_values() {
    let zero = SessionGuardConfig::from_lookup(lookup(&[(ENV_TICK_INTERVAL_MS, "0")]));
    assert!(matches!(zero, Err(ConfigError::Invalid { key, .. }) if key == ENV_TICK_INTERVAL_MS));

    let garbage = SessionGuardConfig::from_lookup(lookup(&[(ENV_WARNING_THRESHOLD_MS, "soon")]));
    assert!(matches!(garbage, Err(ConfigError::Invalid { key, .. }) if key == ENV_WARNING_THRESHOLD_MS));

    let insecure = SessionGuardConfig::from_lookup(lookup(&[(ENV_PROVIDER_URL, "http://id.example.test")]));
    assert!(matches!(insecure, Err(ConfigError::Invalid { key, .. }) if key == ENV_PROVIDER_URL));
}
