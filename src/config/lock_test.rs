use std::time::Duration;

use super::lock::LockConfig;

#[test]
fn test_default_config() {
    let config = LockConfig::default();
    assert_eq!(config.default_timeout(), Duration::from_millis(3000));
    assert_eq!(config.poll_interval(), Duration::from_millis(100));
    assert!(config.validate().is_ok());
}

#[test]
fn test_validation_timeout_range() {
    let mut config = LockConfig::default();

    config.default_timeout_ms = 99;
    assert!(config.validate().is_err());

    config.default_timeout_ms = 600_001;
    assert!(config.validate().is_err());

    config.default_timeout_ms = 600_000;
    assert!(config.validate().is_ok());
}

#[test]
fn test_validation_poll_interval_must_be_below_timeout() {
    let mut config = LockConfig {
        default_timeout_ms: 1000,
        poll_interval_ms: 1000,
    };
    assert!(config.validate().is_err());

    config.poll_interval_ms = 0;
    assert!(config.validate().is_err());

    config.poll_interval_ms = 999;
    assert!(config.validate().is_ok());
}
