//! JWT verification against the key cache.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The verification algorithm comes from the key set when it declares one;
//!   the token header can only choose within the key's family
//! - `exp` and `nbf` are validated with clock skew tolerance when present
//! - The issuer is enforced for keys loaded with a required issuer
//! - Generic error messages prevent information leakage

use crate::auth::{Claims, JwtPrincipal};
use crate::errors::GuardError;
use crate::keys::{LoadedKey, PublicKeyLoader};
use common::jwt::inspect_header;
use jsonwebtoken::{decode, Algorithm, Validation};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Verifies bearer tokens with keys from a [`PublicKeyLoader`].
pub struct JwtVerifier {
    keys: Arc<PublicKeyLoader>,
    clock_skew: Duration,
}

impl JwtVerifier {
    /// # Arguments
    ///
    /// * `keys` - Key cache used to resolve the signing key
    /// * `clock_skew` - Leeway applied to `exp` and `nbf`
    pub fn new(keys: Arc<PublicKeyLoader>, clock_skew: Duration) -> Self {
        Self { keys, clock_skew }
    }

    /// Verify `token` and return it with its claims.
    ///
    /// # Errors
    ///
    /// - `GuardError::InvalidToken` - undecodable token, missing `kid`, bad
    ///   signature, algorithm or issuer mismatch, expired or not yet valid
    /// - `GuardError::NoPublicKey` - no key for the token's `kid`/`x5t`, even
    ///   after one reload
    #[instrument(skip_all)]
    pub async fn authenticate(&self, token: &str) -> Result<JwtPrincipal, GuardError> {
        let header = inspect_header(token).map_err(|e| {
            tracing::debug!(target: "guard.auth.jwt", error = ?e, "Token header rejected");
            GuardError::invalid_token()
        })?;

        let key = self
            .keys
            .resolve(&header.kid, header.x5t.as_deref())
            .await
            .ok_or_else(|| {
                tracing::debug!(target: "guard.auth.jwt", kid = %header.kid, "No public key for token");
                GuardError::NoPublicKey {
                    kid: header.kid.clone(),
                }
            })?;

        let claims = verify_with_key(token, header.alg.as_deref(), &key, self.clock_skew)?;

        tracing::debug!(target: "guard.auth.jwt", kid = %header.kid, "Token verified");
        Ok(JwtPrincipal {
            token: token.to_string(),
            claims,
        })
    }
}

/// Check the signature and registered claims of `token` with `key`.
fn verify_with_key(
    token: &str,
    header_alg: Option<&str>,
    key: &LoadedKey,
    clock_skew: Duration,
) -> Result<Claims, GuardError> {
    let algorithm = match key.algorithm() {
        Some(algorithm) => algorithm,
        None => header_alg
            .and_then(|alg| Algorithm::from_str(alg).ok())
            .ok_or_else(|| {
                tracing::debug!(target: "guard.auth.jwt", alg = ?header_alg, "Unsupported token algorithm");
                GuardError::invalid_token()
            })?,
    };

    let mut validation = Validation::new(algorithm);
    validation.leeway = clock_skew.as_secs();
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    if !key.required_issuer().is_empty() {
        validation.set_issuer(&[key.required_issuer()]);
        validation.required_spec_claims.insert("iss".to_string());
    }

    let token_data = decode::<Claims>(token, key.decoding_key(), &validation).map_err(|e| {
        tracing::debug!(target: "guard.auth.jwt", error = %e, "Token verification failed");
        GuardError::invalid_token()
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::keys::JwksKeySource;
    use common::jwt::MAX_JWT_SIZE_BYTES;
    use guard_test_utils::{jwks_mock, TestClaimsBuilder, TestKeypair, TestRsaKeypair, JWKS_PATH};
    use jsonwebtoken::Header;
    use wiremock::MockServer;

    const ISSUER: &str = "https://issuer.example.com";

    async fn verifier_for(server: &MockServer, required_issuer: &str) -> JwtVerifier {
        let loader = Arc::new(PublicKeyLoader::new());
        loader
            .register_source(Arc::new(JwksKeySource::new(
                format!("{}{}", server.uri(), JWKS_PATH),
                required_issuer.to_string(),
                reqwest::Client::new(),
            )))
            .await
            .unwrap();
        JwtVerifier::new(loader, Duration::from_secs(300))
    }

    async fn server_with(keys: &[&TestKeypair]) -> MockServer {
        let server = MockServer::start().await;
        let jwks: Vec<_> = keys.iter().map(|k| k.jwk_json()).collect();
        jwks_mock(JWKS_PATH, &jwks).mount(&server).await;
        server
    }

    #[tokio::test]
    async fn test_authenticate_valid_token_returns_claims() {
        let keypair = TestKeypair::new(1, "test-key-01");
        let server = server_with(&[&keypair]).await;
        let verifier = verifier_for(&server, "").await;

        let claims = TestClaimsBuilder::new()
            .subject("alice")
            .claim("roles", serde_json::json!(["admin"]))
            .build();
        let token = keypair.sign_token(&claims);

        let principal = verifier.authenticate(&token).await.unwrap();

        assert_eq!(principal.token, token);
        assert_eq!(serde_json::Value::Object(principal.claims), claims);
    }

    #[tokio::test]
    async fn test_authenticate_rs256_against_rsa_key_set() {
        let rsa = TestRsaKeypair::new("rsa-key-01");
        let ed25519 = TestKeypair::new(1, "ed-key-01");
        let server = MockServer::start().await;
        jwks_mock(JWKS_PATH, &[rsa.jwk_json(), ed25519.jwk_json()])
            .mount(&server)
            .await;
        let verifier = verifier_for(&server, ISSUER).await;

        let claims = TestClaimsBuilder::new().subject("alice").issuer(ISSUER).build();
        let principal = verifier.authenticate(&rsa.sign_token(&claims)).await.unwrap();

        assert_eq!(principal.claims["sub"], "alice");
    }

    #[tokio::test]
    async fn test_authenticate_unknown_kid_reloads_once_then_fails() {
        let known = TestKeypair::new(1, "known");
        let unknown = TestKeypair::new(2, "unknown");
        let server = MockServer::start().await;
        // One load at registration, exactly one more for the miss
        jwks_mock(JWKS_PATH, &[known.jwk_json()])
            .expect(2)
            .mount(&server)
            .await;
        let verifier = verifier_for(&server, "").await;

        let token = unknown.sign_token(&TestClaimsBuilder::new().build());
        let result = verifier.authenticate(&token).await;

        assert_eq!(
            result,
            Err(GuardError::NoPublicKey {
                kid: "unknown".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_authenticate_selects_key_by_x5t() {
        let keypair = TestKeypair::new(1, "published-kid").with_x5t("thumb-1");
        let server = server_with(&[&keypair]).await;
        let verifier = verifier_for(&server, "").await;

        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some("other-kid".to_string());
        header.x5t = Some("thumb-1".to_string());
        let token = keypair.sign_with_header(&header, &TestClaimsBuilder::new().build());

        assert!(verifier.authenticate(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_authenticate_missing_kid_is_invalid() {
        let keypair = TestKeypair::new(1, "test-key-01");
        let server = server_with(&[&keypair]).await;
        let verifier = verifier_for(&server, "").await;

        let header = Header::new(Algorithm::EdDSA);
        let token = keypair.sign_with_header(&header, &TestClaimsBuilder::new().build());

        assert!(matches!(
            verifier.authenticate(&token).await,
            Err(GuardError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_wrong_signing_key_is_invalid() {
        let published = TestKeypair::new(1, "test-key-01");
        let impostor = TestKeypair::new(2, "test-key-01");
        let server = server_with(&[&published]).await;
        let verifier = verifier_for(&server, "").await;

        let token = impostor.sign_token(&TestClaimsBuilder::new().build());

        assert!(matches!(
            verifier.authenticate(&token).await,
            Err(GuardError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_expired_token() {
        let keypair = TestKeypair::new(1, "test-key-01");
        let server = server_with(&[&keypair]).await;
        let verifier = verifier_for(&server, "").await;

        let expired = keypair.sign_token(&TestClaimsBuilder::new().expires_in(-3600).build());
        let within_skew = keypair.sign_token(&TestClaimsBuilder::new().expires_in(-60).build());

        assert!(matches!(
            verifier.authenticate(&expired).await,
            Err(GuardError::InvalidToken(_))
        ));
        assert!(verifier.authenticate(&within_skew).await.is_ok());
    }

    #[tokio::test]
    async fn test_authenticate_not_yet_valid_token() {
        let keypair = TestKeypair::new(1, "test-key-01");
        let server = server_with(&[&keypair]).await;
        let verifier = verifier_for(&server, "").await;

        let token = keypair.sign_token(&TestClaimsBuilder::new().not_before_in(3600).build());

        assert!(matches!(
            verifier.authenticate(&token).await,
            Err(GuardError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_token_without_exp_is_accepted() {
        let keypair = TestKeypair::new(1, "test-key-01");
        let server = server_with(&[&keypair]).await;
        let verifier = verifier_for(&server, "").await;

        let token = keypair.sign_token(&TestClaimsBuilder::new().without_expiry().build());

        assert!(verifier.authenticate(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_authenticate_enforces_required_issuer() {
        let keypair = TestKeypair::new(1, "test-key-01");
        let server = server_with(&[&keypair]).await;
        let verifier = verifier_for(&server, ISSUER).await;

        let matching = keypair.sign_token(&TestClaimsBuilder::new().issuer(ISSUER).build());
        let other = keypair.sign_token(
            &TestClaimsBuilder::new()
                .issuer("https://evil.example.com")
                .build(),
        );
        let missing = keypair.sign_token(&TestClaimsBuilder::new().build());

        assert!(verifier.authenticate(&matching).await.is_ok());
        assert!(matches!(
            verifier.authenticate(&other).await,
            Err(GuardError::InvalidToken(_))
        ));
        assert!(matches!(
            verifier.authenticate(&missing).await,
            Err(GuardError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_algorithm_other_than_declared() {
        let keypair = TestKeypair::new(1, "test-key-01");
        let server = server_with(&[&keypair]).await;
        let verifier = verifier_for(&server, "").await;

        // Header claims HS256 over an EdDSA key; the signature part is irrelevant
        let token = keypair.sign_token(&TestClaimsBuilder::new().build());
        let mut parts = token.splitn(2, '.');
        let _ = parts.next();
        let rest = parts.next().unwrap();
        let forged_header = base64_url(r#"{"alg":"HS256","typ":"JWT","kid":"test-key-01"}"#);
        let forged = format!("{forged_header}.{rest}");

        assert!(matches!(
            verifier.authenticate(&forged).await,
            Err(GuardError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_oversized_token_rejected_before_lookup() {
        let server = MockServer::start().await;
        // Registration load only; an oversized token must not trigger a reload
        jwks_mock(JWKS_PATH, &[]).expect(1).mount(&server).await;
        let verifier = verifier_for(&server, "").await;

        let token = "a".repeat(MAX_JWT_SIZE_BYTES + 1);

        assert!(matches!(
            verifier.authenticate(&token).await,
            Err(GuardError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_malformed_token() {
        let server = server_with(&[]).await;
        let verifier = verifier_for(&server, "").await;

        for token in ["", "not-a-jwt", "a.b", "a.b.c.d"] {
            assert!(
                matches!(
                    verifier.authenticate(token).await,
                    Err(GuardError::InvalidToken(_))
                ),
                "token {token:?} should be rejected"
            );
        }
    }

    fn base64_url(value: &str) -> String {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        URL_SAFE_NO_PAD.encode(value)
    }
}
