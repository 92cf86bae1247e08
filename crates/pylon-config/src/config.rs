//! Configuration types.
//!
//! This module provides the top-level [`PylonConfig`] struct and its
//! sections. Every section denies unknown fields so that typos in a config
//! file fail loudly instead of being ignored.

use std::collections::BTreeMap;

use pylon_telemetry::LogLevel;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Default mount path for every endpoint.
pub const DEFAULT_BASE_PATH: &str = "/api";

/// Complete pipeline configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and the
/// environment. Options that cannot be serialized (error callbacks, global
/// hooks, id generators) are set on the pipeline builder instead.
///
/// # Example
///
/// ```
/// use pylon_config::PylonConfig;
///
/// let config = PylonConfig::default();
/// assert_eq!(config.base_path, "/api");
/// assert!(!config.rate_limit.enabled);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PylonConfig {
    /// Public URL of the service. Only its origin is kept.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Path prefix under which endpoints are mounted.
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Secret used to sign cookies.
    #[serde(default)]
    pub secret: Option<String>,

    /// Logger options.
    #[serde(default)]
    pub logger: LoggerConfig,

    /// Rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Error reporting behaviour.
    #[serde(default)]
    pub on_api_error: OnApiErrorConfig,

    /// Rarely needed switches.
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

fn default_base_path() -> String {
    DEFAULT_BASE_PATH.to_string()
}

impl Default for PylonConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            base_path: default_base_path(),
            secret: None,
            logger: LoggerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            on_api_error: OnApiErrorConfig::default(),
            advanced: AdvancedConfig::default(),
        }
    }
}

impl PylonConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - `base_url` is not an absolute http(s) URL
    /// - `base_path` does not start with `/`
    /// - a rate limit window or maximum is zero
    /// - `secret` is set but empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(base_url) = &self.base_url {
            origin_of(base_url)?;
        }

        if !self.base_path.starts_with('/') {
            return Err(ConfigError::invalid_value(
                "base_path",
                format!("must start with '/': {}", self.base_path),
            ));
        }

        if matches!(&self.secret, Some(secret) if secret.is_empty()) {
            return Err(ConfigError::invalid_value("secret", "must not be empty"));
        }

        self.rate_limit.validate()
    }

    /// Returns the origin (`scheme://host[:port]`) of `base_url`, if set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `base_url` cannot be parsed.
    pub fn base_origin(&self) -> Result<Option<String>, ConfigError> {
        self.base_url.as_deref().map(origin_of).transpose()
    }

    /// Deep-merges a JSON patch over this configuration and validates the
    /// result.
    ///
    /// Objects merge key by key; any other value, including `null`, replaces
    /// the current one. Keys this configuration does not know are rejected.
    ///
    /// # Example
    ///
    /// ```
    /// use pylon_config::PylonConfig;
    /// use serde_json::json;
    ///
    /// let patched = PylonConfig::default()
    ///     .merge_patch(&json!({ "rate_limit": { "enabled": true } }))
    ///     .unwrap();
    /// assert!(patched.rate_limit.enabled);
    /// assert_eq!(patched.rate_limit.max, 100);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::JsonError` if the merged document no longer
    /// describes a configuration, or `ConfigError::InvalidValue` if it fails
    /// [`validate`](Self::validate).
    pub fn merge_patch(&self, patch: &serde_json::Value) -> Result<Self, ConfigError> {
        let mut document = serde_json::to_value(self)?;
        merge_value(&mut document, patch);
        let merged: Self = serde_json::from_value(document)?;
        merged.validate()?;
        Ok(merged)
    }

    /// Create a development configuration preset: verbose logging, no rate
    /// limiting.
    #[must_use]
    pub fn development() -> Self {
        Self {
            logger: LoggerConfig {
                disabled: false,
                level: Some(LogLevel::Debug),
            },
            ..Self::default()
        }
    }

    /// Create a production configuration preset: error logging, rate
    /// limiting enabled.
    #[must_use]
    pub fn production() -> Self {
        Self {
            logger: LoggerConfig {
                disabled: false,
                level: Some(LogLevel::Error),
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                ..RateLimitConfig::default()
            },
            ..Self::default()
        }
    }
}

fn merge_value(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(target), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

fn origin_of(base_url: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(base_url)
        .map_err(|e| ConfigError::invalid_value("base_url", format!("{base_url}: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ConfigError::invalid_value(
            "base_url",
            format!("expected an absolute http(s) URL: {base_url}"),
        ));
    }

    Ok(parsed.origin().ascii_serialization())
}

/// Logger options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggerConfig {
    /// Suppress all pipeline logging.
    #[serde(default)]
    pub disabled: bool,

    /// Verbosity threshold. Unset means errors only, and typed client errors
    /// are not reported.
    #[serde(default)]
    pub level: Option<LogLevel>,
}

/// Fixed-window rate limiting options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Whether requests are counted at all.
    #[serde(default)]
    pub enabled: bool,

    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Requests allowed per window.
    #[serde(default = "default_max")]
    pub max: u32,

    /// Per-path overrides, keyed by request path.
    #[serde(default)]
    pub custom_rules: BTreeMap<String, RateLimitRule>,
}

const fn default_window_secs() -> u64 {
    10
}

const fn default_max() -> u32 {
    100
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_secs: default_window_secs(),
            max: default_max(),
            custom_rules: BTreeMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Returns the rule that applies to `path`.
    #[must_use]
    pub fn rule_for(&self, path: &str) -> RateLimitRule {
        self.custom_rules.get(path).copied().unwrap_or(RateLimitRule {
            window_secs: self.window_secs,
            max: self.max,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let default_rule = RateLimitRule {
            window_secs: self.window_secs,
            max: self.max,
        };
        default_rule.validate("rate_limit")?;
        for (path, rule) in &self.custom_rules {
            rule.validate(&format!("rate_limit.custom_rules.{path}"))?;
        }
        Ok(())
    }
}

/// A window/limit pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RateLimitRule {
    /// Window length in seconds.
    pub window_secs: u64,
    /// Requests allowed per window.
    pub max: u32,
}

impl RateLimitRule {
    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.window_secs == 0 {
            return Err(ConfigError::invalid_value(
                format!("{field}.window_secs"),
                "must be greater than zero",
            ));
        }
        if self.max == 0 {
            return Err(ConfigError::invalid_value(
                format!("{field}.max"),
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// What the router does with errors raised by endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OnApiErrorConfig {
    /// Propagate errors to the transport instead of reporting them.
    #[serde(default)]
    pub throw: bool,
}

/// Rarely needed switches.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AdvancedConfig {
    /// Fail pipeline construction when two sources register the same
    /// endpoint name, instead of letting the later one win.
    #[serde(default)]
    pub strict_endpoint_names: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PylonConfig::default();
        assert_eq!(config.base_path, "/api");
        assert!(config.base_url.is_none());
        assert!(!config.logger.disabled);
        assert!(config.logger.level.is_none());
        assert_eq!(config.rate_limit.window_secs, 10);
        assert_eq!(config.rate_limit.max, 100);
        assert!(!config.on_api_error.throw);
        assert!(!config.advanced.strict_endpoint_names);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_base_origin_strips_path() {
        let config = PylonConfig {
            base_url: Some("https://example.com:8443/app/api?x=1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.base_origin().unwrap().as_deref(),
            Some("https://example.com:8443")
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = PylonConfig {
            base_url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PylonConfig {
            base_url: Some("ftp://example.com".to_string()),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_invalid_base_path() {
        let config = PylonConfig {
            base_path: "api".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_secret_rejected() {
        let config = PylonConfig {
            secret: Some(String::new()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = PylonConfig::default();
        config.rate_limit.custom_rules.insert(
            "/sign-in".to_string(),
            RateLimitRule {
                window_secs: 0,
                max: 3,
            },
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("/sign-in"));
    }

    #[test]
    fn test_rule_for_path() {
        let mut config = RateLimitConfig::default();
        config.custom_rules.insert(
            "/sign-in".to_string(),
            RateLimitRule {
                window_secs: 60,
                max: 3,
            },
        );
        assert_eq!(config.rule_for("/sign-in").max, 3);
        assert_eq!(config.rule_for("/ok").max, 100);
        assert_eq!(config.rule_for("/ok").window_secs, 10);
    }

    #[test]
    fn test_presets() {
        let dev = PylonConfig::development();
        assert_eq!(dev.logger.level, Some(LogLevel::Debug));
        assert!(!dev.rate_limit.enabled);

        let prod = PylonConfig::production();
        assert_eq!(prod.logger.level, Some(LogLevel::Error));
        assert!(prod.rate_limit.enabled);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<PylonConfig, _> = toml::from_str("base_pth = \"/x\"");
        assert!(result.is_err());

        let result: Result<PylonConfig, _> = toml::from_str("[logger]\nverbose = true");
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_patch_is_deep() {
        let mut base = PylonConfig::default();
        base.rate_limit.max = 7;
        base.secret = Some("s3cret".into());

        let patched = base
            .merge_patch(&serde_json::json!({
                "rate_limit": { "enabled": true, "custom_rules": { "/sign-in": { "window_secs": 60, "max": 1 } } },
                "secret": null,
            }))
            .unwrap();

        assert!(patched.rate_limit.enabled);
        assert_eq!(patched.rate_limit.max, 7);
        assert_eq!(patched.rate_limit.rule_for("/sign-in").max, 1);
        assert!(patched.secret.is_none());
        assert_eq!(patched.base_path, "/api");
    }

    #[test]
    fn test_merge_patch_rejects_bad_results() {
        let base = PylonConfig::default();
        assert!(matches!(
            base.merge_patch(&serde_json::json!({ "base_pth": "/x" })),
            Err(ConfigError::JsonError(_))
        ));
        assert!(matches!(
            base.merge_patch(&serde_json::json!({ "base_path": "api" })),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
