//! Configuration system for the APEX license service.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `APEX_SERVER_HOST` - Server bind address
//! - `APEX_SERVER_PORT` - Server port
//! - `APEX_DATABASE_TYPE` - Store backend (`sqlite` or `memory`)
//! - `APEX_DATABASE_URL` - SQLite connection URL
//! - `APEX_LICENSE_KEY_PREFIX` - License key prefix
//! - `APEX_MAX_TRIAL_DAYS` - Longest trial that may be issued
//! - `APEX_LOGGING_ENABLED` - Enable the tracing subscriber
//! - `APEX_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
//! - `APEX_RATE_LIMIT_ENABLED` - Enable per-IP rate limiting (requires `rate-limiting` feature)

use config::Config;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::errors::{LicenseError, LicenseResult};

/// Global configuration singleton.
static CONFIG: OnceLock<ApexConfig> = OnceLock::new();

const DEFAULT_PREMIUM_FEATURES: [&str; 5] = [
    "premium-feature",
    "aws-commands",
    "gcp-commands",
    "prod-environment",
    "command-history",
];

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApexConfig {
    pub server: ServerConfig,
    pub license: LicenseConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub features: FeaturesConfig,
    pub rate_limit: RateLimitConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// License key and issuance configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Prefix for generated license keys (e.g., "WARP" -> "WARP-XXXX-XXXX-XXXX-XXXX")
    pub key_prefix: String,
    /// Number of segments in the license key
    pub key_segments: u8,
    /// Characters per segment
    pub key_segment_length: u8,
    /// Longest trial (in days) the issuer accepts
    pub max_trial_days: i64,
    /// Attempts at finding an unused key before giving up
    pub key_generation_retries: u32,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            key_prefix: "WARP".to_string(),
            key_segments: 4,
            key_segment_length: 4,
            max_trial_days: 365,
            key_generation_retries: 10,
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Store backend: "sqlite" or "memory"
    pub db_type: String,
    /// SQLite connection URL. Empty means `<data dir>/apex/license.db`.
    pub sqlite_url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: String::new(),
        }
    }
}

impl DatabaseConfig {
    /// The SQLite URL to connect to, falling back to the platform data directory.
    ///
    /// - Windows: `%APPDATA%\apex\license.db`
    /// - macOS: `~/Library/Application Support/apex/license.db`
    /// - Linux: `~/.local/share/apex/license.db`
    pub fn resolved_sqlite_url(&self) -> String {
        if !self.sqlite_url.is_empty() {
            return self.sqlite_url.clone();
        }

        match Self::default_sqlite_path() {
            Some(path) => format!("sqlite://{}?mode=rwc", path.display()),
            None => "sqlite://apex_license.db?mode=rwc".to_string(),
        }
    }

    /// Platform location of the license database, if a data directory exists.
    pub fn default_sqlite_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("apex").join("license.db"))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

/// Premium feature catalogue.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Feature ids unlocked by an active license
    pub premium: Vec<String>,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            premium: DEFAULT_PREMIUM_FEATURES
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

/// Per-IP rate limits for the public license endpoints.
///
/// Only consulted when the `rate-limiting` feature is compiled in.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// `/api/license/generate-trial` requests per minute
    pub trial_rpm: u32,
    /// `/api/license/activate` requests per minute
    pub activate_rpm: u32,
    /// Requests allowed above the steady rate in a short burst
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trial_rpm: 10,
            activate_rpm: 30,
            burst_size: 5,
        }
    }
}

fn config_err(e: config::ConfigError) -> LicenseError {
    LicenseError::ConfigError(e.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl ApexConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> LicenseResult<Self> {
        let defaults = ApexConfig::default();

        let builder = Config::builder()
            .set_default("server.host", defaults.server.host)
            .map_err(config_err)?
            .set_default("server.port", i64::from(defaults.server.port))
            .map_err(config_err)?
            .set_default("license.key_prefix", defaults.license.key_prefix)
            .map_err(config_err)?
            .set_default("license.key_segments", i64::from(defaults.license.key_segments))
            .map_err(config_err)?
            .set_default(
                "license.key_segment_length",
                i64::from(defaults.license.key_segment_length),
            )
            .map_err(config_err)?
            .set_default("license.max_trial_days", defaults.license.max_trial_days)
            .map_err(config_err)?
            .set_default(
                "license.key_generation_retries",
                i64::from(defaults.license.key_generation_retries),
            )
            .map_err(config_err)?
            .set_default("database.db_type", defaults.database.db_type)
            .map_err(config_err)?
            .set_default("database.sqlite_url", defaults.database.sqlite_url)
            .map_err(config_err)?
            .set_default("logging.enabled", defaults.logging.enabled)
            .map_err(config_err)?
            .set_default("logging.level", defaults.logging.level)
            .map_err(config_err)?
            .set_default("features.premium", defaults.features.premium)
            .map_err(config_err)?
            .set_default("rate_limit.enabled", defaults.rate_limit.enabled)
            .map_err(config_err)?
            .set_default("rate_limit.trial_rpm", i64::from(defaults.rate_limit.trial_rpm))
            .map_err(config_err)?
            .set_default(
                "rate_limit.activate_rpm",
                i64::from(defaults.rate_limit.activate_rpm),
            )
            .map_err(config_err)?
            .set_default("rate_limit.burst_size", i64::from(defaults.rate_limit.burst_size))
            .map_err(config_err)?
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("APEX_SERVER_HOST").ok())
            .map_err(config_err)?
            .set_override_option("server.port", env_parsed::<i64>("APEX_SERVER_PORT"))
            .map_err(config_err)?
            .set_override_option("database.db_type", env::var("APEX_DATABASE_TYPE").ok())
            .map_err(config_err)?
            .set_override_option("database.sqlite_url", env::var("APEX_DATABASE_URL").ok())
            .map_err(config_err)?
            .set_override_option(
                "license.key_prefix",
                env::var("APEX_LICENSE_KEY_PREFIX").ok(),
            )
            .map_err(config_err)?
            .set_override_option(
                "license.max_trial_days",
                env_parsed::<i64>("APEX_MAX_TRIAL_DAYS"),
            )
            .map_err(config_err)?
            .set_override_option(
                "logging.enabled",
                env_parsed::<bool>("APEX_LOGGING_ENABLED"),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("APEX_LOG_LEVEL").ok())
            .map_err(config_err)?
            .set_override_option(
                "rate_limit.enabled",
                env_parsed::<bool>("APEX_RATE_LIMIT_ENABLED"),
            )
            .map_err(config_err)?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.server.port == 0 {
            return Err(LicenseError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "memory" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "database.db_type must be 'sqlite' or 'memory', got '{other}'"
                )));
            }
        }

        if self.license.key_prefix.is_empty() || self.license.key_prefix.contains('-') {
            return Err(LicenseError::ConfigError(
                "license.key_prefix must be non-empty and must not contain '-'".to_string(),
            ));
        }
        if self.license.key_segments == 0 || self.license.key_segment_length == 0 {
            return Err(LicenseError::ConfigError(
                "license.key_segments and license.key_segment_length must be greater than 0"
                    .to_string(),
            ));
        }
        // One payload character plus the check character at minimum.
        if u32::from(self.license.key_segments) * u32::from(self.license.key_segment_length) < 2 {
            return Err(LicenseError::ConfigError(
                "license keys need at least 2 characters across all segments".to_string(),
            ));
        }
        if self.license.max_trial_days <= 0 {
            return Err(LicenseError::ConfigError(
                "license.max_trial_days must be greater than 0".to_string(),
            ));
        }
        if self.license.key_generation_retries == 0 {
            return Err(LicenseError::ConfigError(
                "license.key_generation_retries must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        if self.features.premium.iter().any(|f| f.trim().is_empty()) {
            return Err(LicenseError::ConfigError(
                "features.premium cannot contain empty feature ids".to_string(),
            ));
        }

        if self.rate_limit.enabled
            && (self.rate_limit.trial_rpm == 0
                || self.rate_limit.activate_rpm == 0
                || self.rate_limit.burst_size == 0)
        {
            return Err(LicenseError::ConfigError(
                "rate_limit values must be greater than 0 when rate limiting is enabled"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> LicenseResult<&'static ApexConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = ApexConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is equally valid.
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ApexConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_unknown_db_type() {
        let mut config = ApexConfig::default();
        config.database.db_type = "postgres".to_string();
        assert!(matches!(
            config.validate(),
            Err(LicenseError::ConfigError(_))
        ));
    }

    #[test]
    fn rejects_prefix_with_separator() {
        let mut config = ApexConfig::default();
        config.license.key_prefix = "AP-EX".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_single_character_keys() {
        let mut config = ApexConfig::default();
        config.license.key_segments = 1;
        config.license.key_segment_length = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rate_limits_checked_only_when_enabled() {
        let mut config = ApexConfig::default();
        config.rate_limit.trial_rpm = 0;
        assert!(config.validate().is_ok());

        config.rate_limit.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_sqlite_url_wins() {
        let config = DatabaseConfig {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite::memory:".to_string(),
        };
        assert_eq!(config.resolved_sqlite_url(), "sqlite::memory:");
    }

    #[test]
    fn default_premium_catalogue_contains_premium_feature() {
        let config = FeaturesConfig::default();
        assert!(config.premium.iter().any(|f| f == "premium-feature"));
    }
}
