use std::env;

use serial_test::serial;

use apex_license::config::ApexConfig;

const VARS: &[&str] = &[
    "APEX_SERVER_HOST",
    "APEX_SERVER_PORT",
    "APEX_DATABASE_TYPE",
    "APEX_DATABASE_URL",
    "APEX_LICENSE_KEY_PREFIX",
    "APEX_MAX_TRIAL_DAYS",
    "APEX_LOGGING_ENABLED",
    "APEX_LOG_LEVEL",
    "APEX_RATE_LIMIT_ENABLED",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn load_uses_defaults_without_overrides() {
    clear_env();

    let config = ApexConfig::load().expect("config should load");
    assert_eq!(config.server.port, 8000);
    assert_eq!(config.license.key_prefix, "WARP");
    assert_eq!(config.license.max_trial_days, 365);
    assert_eq!(config.database.db_type, "sqlite");
    assert!(config
        .features
        .premium
        .iter()
        .any(|f| f == "premium-feature"));
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn env_overrides_take_precedence() {
    clear_env();
    env::set_var("APEX_SERVER_PORT", "9100");
    env::set_var("APEX_DATABASE_TYPE", "memory");
    env::set_var("APEX_MAX_TRIAL_DAYS", "30");
    env::set_var("APEX_RATE_LIMIT_ENABLED", "true");
    env::set_var("APEX_LOG_LEVEL", "debug");

    let config = ApexConfig::load().expect("config should load");
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.database.db_type, "memory");
    assert_eq!(config.license.max_trial_days, 30);
    assert!(config.rate_limit.enabled);
    assert_eq!(config.logging.level, "debug");

    clear_env();
}

#[test]
#[serial]
fn unparseable_numeric_override_is_ignored() {
    clear_env();
    env::set_var("APEX_SERVER_PORT", "not-a-port");

    let config = ApexConfig::load().expect("config should load");
    assert_eq!(config.server.port, 8000);

    clear_env();
}

#[test]
#[serial]
fn invalid_database_type_fails_validation() {
    clear_env();
    env::set_var("APEX_DATABASE_TYPE", "postgres");

    let config = ApexConfig::load().expect("config should load");
    assert!(config.validate().is_err());

    clear_env();
}
