//! Key source backed by a JSON Web Key Set document.

use super::{fetch_json, KeyLoadError, KeyOrigin, KeySource, KeySourceKind, LoadedKey};
use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use tracing::instrument;

/// Fetches keys from a fixed JWKS URL.
///
/// Every entry must parse as a JWK. Encryption keys are skipped; a single
/// malformed signing entry fails the whole load.
#[derive(Debug, Clone)]
pub struct JwksKeySource {
    jwks_url: String,
    required_issuer: String,
    http: reqwest::Client,
}

impl JwksKeySource {
    /// # Arguments
    ///
    /// * `jwks_url` - URL of the JWKS document
    /// * `required_issuer` - Issuer attached to every loaded key (may be empty)
    /// * `http` - Shared HTTP client
    pub fn new(jwks_url: String, required_issuer: String, http: reqwest::Client) -> Self {
        Self {
            jwks_url,
            required_issuer,
            http,
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }
}

#[async_trait]
impl KeySource for JwksKeySource {
    #[instrument(skip_all, fields(url = %self.jwks_url))]
    async fn load_keys(&self) -> Result<Vec<LoadedKey>, KeyLoadError> {
        tracing::debug!(target: "guard.keys.jwks", url = %self.jwks_url, "Fetching JWKS");

        let jwks: JwkSet = fetch_json(&self.http, &self.jwks_url).await.map_err(|e| {
            tracing::error!(target: "guard.keys.jwks", error = %e, "Failed to fetch JWKS");
            e
        })?;

        let origin = self.origin();
        let mut keys = Vec::with_capacity(jwks.keys.len());
        for jwk in &jwks.keys {
            if let Some(key) = LoadedKey::from_jwk(jwk, &self.required_issuer, &origin)? {
                keys.push(key);
            }
        }

        tracing::debug!(
            target: "guard.keys.jwks",
            url = %self.jwks_url,
            key_count = keys.len(),
            "JWKS loaded"
        );

        Ok(keys)
    }

    fn origin(&self) -> KeyOrigin {
        KeyOrigin {
            kind: KeySourceKind::Jwks,
            location: self.jwks_url.clone(),
        }
    }
}
