//! Configuration module for bkt-guard
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.

use crate::authz::CombinationRule;
use crate::credentials::DEFAULT_MAX_ACTIVE_KEYS;
use lazy_static::lazy_static;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

lazy_static! {
    // ${VAR} or ${VAR:-default}
    static ref ENV_VAR_RE: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}").unwrap();
}

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("BKT_REGION", "eu-west-1");
/// assert_eq!(expand_env_vars("${BKT_REGION}"), "eu-west-1");
/// assert_eq!(expand_env_vars("${MISSING:-us-east-1}"), "us-east-1");
/// ```
fn expand_env_vars(s: &str) -> String {
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in ENV_VAR_RE.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let var_name = var_name.as_str();

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

/// Custom deserializer for strings with environment variable expansion.
fn deserialize_with_env<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(expand_env_vars(&s))
}

fn is_unexpanded(value: &str) -> bool {
    value.contains("${")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub authorization: AuthorizationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let auth = &self.auth;

        if auth.max_clock_skew_secs == 0 || auth.max_clock_skew_secs > MAX_CLOCK_SKEW_LIMIT_SECS {
            return Err(ConfigError::ValidationError(format!(
                "Invalid max_clock_skew_secs {}: must be between 1 and {}",
                auth.max_clock_skew_secs, MAX_CLOCK_SKEW_LIMIT_SECS
            )));
        }

        if is_unexpanded(&auth.encryption_key) {
            return Err(ConfigError::ValidationError(
                "encryption_key references an unset environment variable".into(),
            ));
        }
        if auth.encryption_key.len() < MIN_ENCRYPTION_KEY_LEN {
            return Err(ConfigError::ValidationError(format!(
                "encryption_key must be at least {} characters",
                MIN_ENCRYPTION_KEY_LEN
            )));
        }

        if auth.region.trim().is_empty() || auth.service.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "region and service cannot be empty".into(),
            ));
        }

        if self.credentials.max_active_keys_per_principal == 0 {
            return Err(ConfigError::ValidationError(
                "max_active_keys_per_principal must be at least 1".into(),
            ));
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}': must be trace, debug, info, warn or error",
                self.logging.level
            )));
        }

        Ok(())
    }
}

/// Upper bound accepted for `max_clock_skew_secs`
pub const MAX_CLOCK_SKEW_LIMIT_SECS: u64 = 3600;

pub const MIN_ENCRYPTION_KEY_LEN: usize = 16;

/// Request authentication configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Informational. Each signature binds its own scope, so requests signed
    /// for another region still verify.
    #[serde(default = "default_region", deserialize_with = "deserialize_with_env")]
    pub region: String,

    /// Informational, like `region`
    #[serde(default = "default_service")]
    pub service: String,

    #[serde(default = "default_max_clock_skew_secs")]
    pub max_clock_skew_secs: u64,

    /// Passphrase the secret-at-rest key is derived from.
    /// Supports ${VAR} expansion and should always come from the environment.
    #[serde(deserialize_with = "deserialize_with_env", skip_serializing)]
    pub encryption_key: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("region", &self.region)
            .field("service", &self.service)
            .field("max_clock_skew_secs", &self.max_clock_skew_secs)
            .field("encryption_key", &"**redacted**")
            .finish()
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_service() -> String {
    "s3".to_string()
}

fn default_max_clock_skew_secs() -> u64 {
    900 // 15 minutes
}

/// Access key issuance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_max_active_keys")]
    pub max_active_keys_per_principal: usize,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            max_active_keys_per_principal: default_max_active_keys(),
        }
    }
}

fn default_max_active_keys() -> usize {
    DEFAULT_MAX_ACTIVE_KEYS
}

/// Authorization configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    /// How user and bucket policy decisions combine. Default: strict_deny
    #[serde(default)]
    pub combination_rule: CombinationRule,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error. Default: info
    #[serde(default = "default_log_level", deserialize_with = "deserialize_with_env")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// When false, no component records to the Prometheus collectors
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}
