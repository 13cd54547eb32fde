//! Application configuration.
//!
//! Loaded from JSON (text or file) with `FERROUS_NEST_*` environment
//! overrides applied on top. Every field has a default, so an empty object is
//! a valid configuration.

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DiError, DiResult};

const ENV_PREFIX: &str = "FERROUS_NEST";

/// What to do when a module registers the same token twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Last registration wins; a warning is logged
    #[default]
    Warn,
    /// Bootstrap fails with `DuplicateProvider`
    Error,
}

/// What to do when a singleton depends on a request-bound provider without
/// acknowledging it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopePolicy {
    /// Bootstrap fails with `AmbiguousScope`
    #[default]
    Deny,
    /// The singleton is promoted to request scope; a warning is logged
    Warn,
}

/// Application configuration
///
/// # Examples
///
/// ```rust
/// use ferrous_nest::{AppConfig, DuplicatePolicy};
///
/// let config = AppConfig::from_json_str(r#"{
///     "global_prefix": "api",
///     "request_timeout_ms": 5000,
///     "duplicate_providers": "error"
/// }"#).unwrap();
///
/// assert_eq!(config.global_prefix.as_deref(), Some("api"));
/// assert_eq!(config.duplicate_providers, DuplicatePolicy::Error);
/// assert!(config.eager_singletons);
/// assert!(!config.development);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Include internal error messages in client responses
    pub development: bool,
    /// Prefix prepended to every route path
    pub global_prefix: Option<String>,
    /// Whole-pipeline timeout per request, in milliseconds
    pub request_timeout_ms: Option<u64>,
    /// Duplicate provider policy
    pub duplicate_providers: DuplicatePolicy,
    /// Singleton-on-request-scope policy
    pub scope_violations: ScopePolicy,
    /// Construct every singleton at bootstrap
    pub eager_singletons: bool,
    /// Default `tracing` filter when `FERROUS_NEST_LOG` is unset
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            development: false,
            global_prefix: None,
            request_timeout_ms: None,
            duplicate_providers: DuplicatePolicy::Warn,
            scope_violations: ScopePolicy::Deny,
            eager_singletons: true,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> DiResult<Self> {
        serde_json::from_str(json).map_err(|e| DiError::Config(e.to_string()))
    }

    /// Reads and parses a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> DiResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DiError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&content)
    }

    /// Defaults overridden by the environment.
    pub fn from_env() -> DiResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Applies `FERROUS_NEST_<FIELD>` environment variables.
    ///
    /// Unset variables leave the field untouched; malformed values fail.
    pub fn with_env_overrides(mut self) -> DiResult<Self> {
        if let Some(v) = env_var("DEVELOPMENT") {
            self.development = parse_bool("DEVELOPMENT", &v)?;
        }
        if let Some(v) = env_var("GLOBAL_PREFIX") {
            self.global_prefix = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = env_var("REQUEST_TIMEOUT_MS") {
            let ms = v
                .parse::<u64>()
                .map_err(|e| DiError::Config(format!("{}_REQUEST_TIMEOUT_MS: {}", ENV_PREFIX, e)))?;
            self.request_timeout_ms = Some(ms);
        }
        if let Some(v) = env_var("DUPLICATE_PROVIDERS") {
            self.duplicate_providers = parse_enum("DUPLICATE_PROVIDERS", &v)?;
        }
        if let Some(v) = env_var("SCOPE_VIOLATIONS") {
            self.scope_violations = parse_enum("SCOPE_VIOLATIONS", &v)?;
        }
        if let Some(v) = env_var("EAGER_SINGLETONS") {
            self.eager_singletons = parse_bool("EAGER_SINGLETONS", &v)?;
        }
        if let Some(v) = env_var("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(self)
    }

    /// Request timeout, if configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

fn env_var(field: &str) -> Option<String> {
    env::var(format!("{}_{}", ENV_PREFIX, field)).ok()
}

fn parse_bool(field: &str, value: &str) -> DiResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DiError::Config(format!(
            "{}_{}: expected a boolean, got {:?}",
            ENV_PREFIX, field, value
        ))),
    }
}

fn parse_enum<T: serde::de::DeserializeOwned>(field: &str, value: &str) -> DiResult<T> {
    serde_json::from_value(serde_json::Value::String(value.to_ascii_lowercase()))
        .map_err(|e| DiError::Config(format!("{}_{}: {}", ENV_PREFIX, field, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        assert_eq!(AppConfig::from_json_str("{}").unwrap(), AppConfig::default());
    }

    #[test]
    fn unknown_policy_is_a_config_error() {
        let err = AppConfig::from_json_str(r#"{"scope_violations": "ignore"}"#).unwrap_err();
        assert!(matches!(err, DiError::Config(_)));
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        assert!(parse_bool("X", "Yes").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }
}
