//! A verification key ready for use.

use super::{KeyLoadError, KeyOrigin};
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use std::fmt;

/// A public key loaded from a [`super::KeySource`].
///
/// Immutable once built. Replaced wholesale on every reload.
#[derive(Clone)]
pub struct LoadedKey {
    kid: Option<String>,
    x5t: Option<String>,
    decoding_key: DecodingKey,
    algorithm: Option<Algorithm>,
    required_issuer: String,
    origin: KeyOrigin,
}

impl LoadedKey {
    pub fn new(
        kid: Option<String>,
        x5t: Option<String>,
        decoding_key: DecodingKey,
        algorithm: Option<Algorithm>,
        required_issuer: String,
        origin: KeyOrigin,
    ) -> Self {
        Self {
            kid,
            x5t,
            decoding_key,
            algorithm,
            required_issuer,
            origin,
        }
    }

    /// Build a key from one JWKS entry.
    ///
    /// Returns `Ok(None)` for an entry no lookup could ever select: one with
    /// neither `kid` nor `x5t`, or an encryption key (`"use": "enc"` or a
    /// key-encryption `alg`). Key sets routinely publish both kinds.
    ///
    /// # Errors
    ///
    /// `KeyLoadError::InvalidKey` for a symmetric key or unusable key
    /// parameters.
    pub fn from_jwk(
        jwk: &Jwk,
        required_issuer: &str,
        origin: &KeyOrigin,
    ) -> Result<Option<Self>, KeyLoadError> {
        let invalid = |reason: String| KeyLoadError::InvalidKey {
            location: origin.location.clone(),
            reason,
        };

        let kid = jwk.common.key_id.clone().filter(|kid| !kid.is_empty());
        let x5t = jwk
            .common
            .x509_sha1_fingerprint
            .clone()
            .filter(|x5t| !x5t.is_empty());

        if kid.is_none() && x5t.is_none() {
            tracing::debug!(
                target: "guard.keys.jwks",
                location = %origin.location,
                "Skipping key entry without kid or x5t"
            );
            return Ok(None);
        }

        if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
            tracing::debug!(
                target: "guard.keys.jwks",
                location = %origin.location,
                kid = kid.as_deref().unwrap_or_default(),
                "Skipping encryption key entry"
            );
            return Ok(None);
        }

        let algorithm = match &jwk.common.key_algorithm {
            Some(key_algorithm) => match signing_algorithm(key_algorithm) {
                Some(algorithm) => Some(algorithm),
                None => {
                    tracing::debug!(
                        target: "guard.keys.jwks",
                        location = %origin.location,
                        kid = kid.as_deref().unwrap_or_default(),
                        alg = ?key_algorithm,
                        "Skipping key entry with a non-signature algorithm"
                    );
                    return Ok(None);
                }
            },
            None => None,
        };

        if matches!(jwk.algorithm, AlgorithmParameters::OctetKey(_)) {
            return Err(invalid(format!(
                "symmetric key '{}' is not accepted",
                kid.as_deref().unwrap_or_default()
            )));
        }

        let decoding_key = DecodingKey::from_jwk(jwk).map_err(|e| invalid(e.to_string()))?;

        Ok(Some(Self {
            kid,
            x5t,
            decoding_key,
            algorithm,
            required_issuer: required_issuer.to_string(),
            origin: origin.clone(),
        }))
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    pub fn x5t(&self) -> Option<&str> {
        self.x5t.as_deref()
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Algorithm declared by the key set, if any.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Issuer that tokens verified with this key must carry. Empty means any.
    pub fn required_issuer(&self) -> &str {
        &self.required_issuer
    }

    pub fn origin(&self) -> &KeyOrigin {
        &self.origin
    }

    pub(crate) fn with_origin(mut self, origin: KeyOrigin) -> Self {
        self.origin = origin;
        self
    }
}

impl fmt::Debug for LoadedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedKey")
            .field("kid", &self.kid)
            .field("x5t", &self.x5t)
            .field("algorithm", &self.algorithm)
            .field("required_issuer", &self.required_issuer)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

fn signing_algorithm(key_algorithm: &KeyAlgorithm) -> Option<Algorithm> {
    match key_algorithm {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        // Key-encryption algorithms
        _ => None,
    }
}
