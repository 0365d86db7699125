//! Public key acquisition and caching.
//!
//! - [`KeySource`] - one origin of verification keys (JWKS or OpenID discovery)
//! - [`PublicKeyLoader`] - registered sources plus the current key index,
//!   reloaded wholesale on a cache miss
//!
//! # Security
//!
//! - Key origins are untrusted: a malformed entry fails the whole load for
//!   that source
//! - Symmetric (`oct`) keys are never accepted from a key set
//! - HTTPS should be used in production (enforced by deployment config)

mod discovery;
mod jwks;
mod loaded_key;
mod loader;
mod source;

pub use discovery::DiscoveryKeySource;
pub use jwks::JwksKeySource;
pub use loaded_key::LoadedKey;
pub use loader::{register_configured_sources, PublicKeyLoader};
pub use source::{
    build_key_source, KeyLoadError, KeyOrigin, KeySource, KeySourceConfig, KeySourceKind,
};

use serde::de::DeserializeOwned;
use std::time::Duration;

/// Timeout applied to every key source request.
pub const KEY_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the HTTP client shared by all key sources.
pub fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(KEY_FETCH_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(target: "guard.keys", error = %e, "Failed to build HTTP client with custom config, using defaults");
            reqwest::Client::new()
        })
}

/// GET `location` and decode the JSON body.
///
/// Transport failures, non-2xx statuses and undecodable bodies map to the
/// matching [`KeyLoadError`] variant.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    http: &reqwest::Client,
    location: &str,
) -> Result<T, KeyLoadError> {
    let response = http
        .get(location)
        .send()
        .await
        .map_err(|e| KeyLoadError::Fetch {
            location: location.to_string(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(KeyLoadError::Status {
            location: location.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.bytes().await.map_err(|e| KeyLoadError::Fetch {
        location: location.to_string(),
        reason: e.to_string(),
    })?;

    serde_json::from_slice(&body).map_err(|e| KeyLoadError::Parse {
        location: location.to_string(),
        reason: e.to_string(),
    })
}
