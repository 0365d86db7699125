//! Key source backed by an OpenID provider's discovery document.

use super::{fetch_json, JwksKeySource, KeyLoadError, KeyOrigin, KeySource, KeySourceKind, LoadedKey};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

/// Well-known path of the discovery document, relative to the issuer.
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    #[serde(default)]
    jwks_uri: Option<String>,
}

/// Resolves `jwks_uri` from `<issuer>/.well-known/openid-configuration` and
/// delegates to a [`JwksKeySource`].
///
/// The discovery document is re-read on every load, so a provider moving its
/// key set is picked up on the next reload.
#[derive(Debug, Clone)]
pub struct DiscoveryKeySource {
    issuer_url: String,
    required_issuer: String,
    http: reqwest::Client,
}

impl DiscoveryKeySource {
    pub fn new(issuer_url: String, required_issuer: String, http: reqwest::Client) -> Self {
        Self {
            issuer_url,
            required_issuer,
            http,
        }
    }

    /// URL of the discovery document.
    pub fn discovery_url(&self) -> String {
        format!("{}{}", self.issuer_url.trim_end_matches('/'), DISCOVERY_PATH)
    }
}

#[async_trait]
impl KeySource for DiscoveryKeySource {
    #[instrument(skip_all, fields(issuer = %self.issuer_url))]
    async fn load_keys(&self) -> Result<Vec<LoadedKey>, KeyLoadError> {
        let discovery_url = self.discovery_url();
        tracing::debug!(target: "guard.keys.discovery", url = %discovery_url, "Resolving discovery document");

        let document: DiscoveryDocument =
            fetch_json(&self.http, &discovery_url).await.map_err(|e| {
                tracing::error!(target: "guard.keys.discovery", error = %e, "Failed to fetch discovery document");
                e
            })?;

        let jwks_uri = document
            .jwks_uri
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| {
                tracing::error!(target: "guard.keys.discovery", url = %discovery_url, "Discovery document has no jwks_uri");
                KeyLoadError::MissingJwksUri {
                    location: discovery_url.clone(),
                }
            })?;

        let jwks = JwksKeySource::new(jwks_uri, self.required_issuer.clone(), self.http.clone());
        let origin = self.origin();
        let keys = jwks.load_keys().await?;

        Ok(keys
            .into_iter()
            .map(|key| key.with_origin(origin.clone()))
            .collect())
    }

    fn origin(&self) -> KeyOrigin {
        KeyOrigin {
            kind: KeySourceKind::Discovery,
            location: self.issuer_url.clone(),
        }
    }
}
