//! Guard configuration.
//!
//! Configuration is loaded from environment variables. Credentials embedded
//! in the policy engine URL are redacted in Debug output.

use crate::guard::GuardConfig;
use crate::keys::KeySourceConfig;
use crate::policy::{PolicyConfig, DEFAULT_POLICY_TIMEOUT};
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default policy engine base URL.
pub const DEFAULT_OPA_BASE_URL: &str = "http://localhost:8181";

/// OPA guard configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Key sources from `AUTH_KEYS` followed by those from `AUTH_ISSUERS`.
    pub key_sources: Vec<KeySourceConfig>,

    /// Leeway for `exp` and `nbf`.
    pub jwt_clock_skew: Duration,

    /// Admit every call without checking it.
    pub disable_auth: bool,

    /// Skip policy evaluation for authenticated calls.
    pub disable_opa: bool,

    pub opa_base_url: String,

    /// Policy package, empty when `disable_opa` is set and none was given.
    pub opa_policy_package: String,

    pub opa_timeout: Duration,

    /// Mount point stripped from inbound HTTP paths.
    pub http_context_path: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("key_sources", &self.key_sources)
            .field("jwt_clock_skew", &self.jwt_clock_skew)
            .field("disable_auth", &self.disable_auth)
            .field("disable_opa", &self.disable_opa)
            .field("opa_base_url", &redact_credentials(&self.opa_base_url))
            .field("opa_policy_package", &self.opa_policy_package)
            .field("opa_timeout", &self.opa_timeout)
            .field("http_context_path", &self.http_context_path)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid key source configuration: {0}")]
    InvalidKeySources(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid flag: {0}")]
    InvalidFlag(String),

    #[error("Invalid policy configuration: {0}")]
    InvalidPolicy(String),

    #[error("Invalid context path: {0}")]
    InvalidContextPath(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let mut key_sources: Vec<KeySourceConfig> = match vars.get("AUTH_KEYS") {
            Some(value) if !value.trim().is_empty() => {
                serde_json::from_str(value).map_err(|e| {
                    ConfigError::InvalidKeySources(format!(
                        "AUTH_KEYS must be a JSON array of key sources: {}",
                        e
                    ))
                })?
            }
            _ => Vec::new(),
        };

        if let Some(issuers) = vars.get("AUTH_ISSUERS") {
            key_sources.extend(
                issuers
                    .split(',')
                    .map(str::trim)
                    .filter(|issuer| !issuer.is_empty())
                    .map(KeySourceConfig::for_issuer),
            );
        }

        for source in &key_sources {
            url::Url::parse(&source.location).map_err(|e| {
                ConfigError::InvalidKeySources(format!(
                    "key source location must be an absolute URL, got '{}': {}",
                    source.location, e
                ))
            })?;
        }

        if key_sources.is_empty() {
            tracing::warn!(
                target: "guard.config",
                "No key sources configured (AUTH_KEYS, AUTH_ISSUERS), every token will be rejected"
            );
        }

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidJwtClockSkew(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got 0".to_string(),
                ));
            }

            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_CLOCK_SKEW
        };

        let disable_auth = parse_flag(vars, "DISABLE_AUTH")?;
        let disable_opa = parse_flag(vars, "DISABLE_OPA")?;

        let opa_base_url = vars
            .get("OPA_BASE_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_OPA_BASE_URL.to_string());
        url::Url::parse(&opa_base_url).map_err(|e| {
            ConfigError::InvalidPolicy(format!("OPA_BASE_URL must be an absolute URL: {}", e))
        })?;

        let opa_policy_package = match vars.get("OPA_POLICY_PACKAGE") {
            Some(package) if !package.trim().is_empty() => package.trim().to_string(),
            _ if disable_opa => String::new(),
            _ => return Err(ConfigError::MissingEnvVar("OPA_POLICY_PACKAGE".to_string())),
        };

        let opa_timeout = if let Some(value_str) = vars.get("OPA_TIMEOUT_MS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidPolicy(format!(
                    "OPA_TIMEOUT_MS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidPolicy(
                    "OPA_TIMEOUT_MS must be greater than 0".to_string(),
                ));
            }

            Duration::from_millis(value)
        } else {
            DEFAULT_POLICY_TIMEOUT
        };

        let http_context_path = vars
            .get("HTTP_CONTEXT_PATH")
            .cloned()
            .unwrap_or_else(|| "/".to_string());
        if !http_context_path.starts_with('/') {
            return Err(ConfigError::InvalidContextPath(format!(
                "HTTP_CONTEXT_PATH must start with '/', got '{}'",
                http_context_path
            )));
        }

        Ok(Config {
            bind_address,
            key_sources,
            jwt_clock_skew,
            disable_auth,
            disable_opa,
            opa_base_url,
            opa_policy_package,
            opa_timeout,
            http_context_path,
        })
    }

    pub fn policy_config(&self) -> PolicyConfig {
        PolicyConfig {
            base_url: self.opa_base_url.clone(),
            package: self.opa_policy_package.clone(),
            timeout: self.opa_timeout,
            disabled: self.disable_opa,
        }
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            disable_auth: self.disable_auth,
            context_path: self.http_context_path.clone(),
        }
    }
}

fn parse_flag(vars: &HashMap<String, String>, name: &str) -> Result<bool, ConfigError> {
    let Some(value) = vars.get(name) else {
        return Ok(false);
    };

    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        _ => Err(ConfigError::InvalidFlag(format!(
            "{} must be true, false, 1 or 0, got '{}'",
            name, value
        ))),
    }
}

fn redact_credentials(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("REDACTED"));
            url.to_string()
        }
        _ => raw.to_string(),
    }
}
