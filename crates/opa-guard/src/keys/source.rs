//! The key source capability and its configuration.

use super::{DiscoveryKeySource, JwksKeySource, LoadedKey};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while loading keys from one origin.
///
/// Never surfaced to callers of the guard: a failed reload leaves the previous
/// key set in place and the token is reported as having no public key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyLoadError {
    #[error("Failed to fetch {location}: {reason}")]
    Fetch { location: String, reason: String },

    #[error("{location} returned HTTP {status}")]
    Status { location: String, status: u16 },

    #[error("Failed to parse response from {location}: {reason}")]
    Parse { location: String, reason: String },

    #[error("Invalid key published at {location}: {reason}")]
    InvalidKey { location: String, reason: String },

    #[error("Discovery document at {location} has no jwks_uri")]
    MissingJwksUri { location: String },

    #[error("Invalid key source location '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },
}

/// Kind of key origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum KeySourceKind {
    /// A JSON Web Key Set document.
    #[serde(rename = "JWKS")]
    Jwks,

    /// An OpenID provider resolved through `/.well-known/openid-configuration`.
    #[serde(rename = "DISCOVERY", alias = "OPEN_ID_DISCOVERY")]
    Discovery,
}

impl KeySourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySourceKind::Jwks => "jwks",
            KeySourceKind::Discovery => "discovery",
        }
    }
}

impl fmt::Display for KeySourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor of the source that produced a key.
///
/// Stored on every [`LoadedKey`] instead of a handle to the source itself, so
/// a key never keeps its source alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyOrigin {
    pub kind: KeySourceKind,
    pub location: String,
}

/// One configured key source, as read from `AUTH_KEYS`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySourceConfig {
    #[serde(rename = "type")]
    pub kind: KeySourceKind,

    /// JWKS URL or issuer base URL, depending on `kind`.
    pub location: String,

    /// Issuer the `iss` claim must equal; empty disables the check.
    #[serde(default)]
    pub required_issuer: String,
}

impl KeySourceConfig {
    /// Discovery source for an issuer, which is also the required issuer.
    pub fn for_issuer(issuer: &str) -> Self {
        Self {
            kind: KeySourceKind::Discovery,
            location: issuer.to_string(),
            required_issuer: issuer.to_string(),
        }
    }
}

/// A single origin of verification keys.
///
/// An origin that legitimately publishes no keys returns an empty list.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Fetch the full current key set of this origin.
    async fn load_keys(&self) -> Result<Vec<LoadedKey>, KeyLoadError>;

    /// Where the keys come from.
    fn origin(&self) -> KeyOrigin;
}

/// Build the key source described by `config`.
///
/// # Errors
///
/// Returns `KeyLoadError::InvalidLocation` when the location is not an
/// absolute URL.
pub fn build_key_source(
    config: &KeySourceConfig,
    http: reqwest::Client,
) -> Result<Arc<dyn KeySource>, KeyLoadError> {
    url::Url::parse(&config.location).map_err(|e| KeyLoadError::InvalidLocation {
        location: config.location.clone(),
        reason: e.to_string(),
    })?;

    let source: Arc<dyn KeySource> = match config.kind {
        KeySourceKind::Jwks => Arc::new(JwksKeySource::new(
            config.location.clone(),
            config.required_issuer.clone(),
            http,
        )),
        KeySourceKind::Discovery => Arc::new(DiscoveryKeySource::new(
            config.location.clone(),
            config.required_issuer.clone(),
            http,
        )),
    };
    Ok(source)
}
