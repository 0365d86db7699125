//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 keypairs that can publish themselves as JWKs
//! and sign tokens. The same seed always produces the same keypair. A fixed
//! RSA-2048 key covers RS256 key sets.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};

/// Ed25519 keypair bound to a key id (and optionally a thumbprint).
#[derive(Clone)]
pub struct TestKeypair {
    /// Key id published in the JWK and set in token headers.
    pub kid: String,

    /// Thumbprint published in the JWK as `x5t` and set in token headers.
    pub x5t: Option<String>,

    public_key_bytes: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    /// Create a deterministic keypair from a one-byte seed.
    pub fn new(seed: u8, kid: &str) -> Self {
        let seed_bytes = seed_bytes(seed);

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .expect("Failed to create test keypair");

        Self {
            kid: kid.to_string(),
            x5t: None,
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        }
    }

    /// Attach an `x5t` thumbprint to the published JWK and signed headers.
    pub fn with_x5t(mut self, x5t: &str) -> Self {
        self.x5t = Some(x5t.to_string());
        self
    }

    /// Sign claims with this key, setting `kid` (and `x5t` when present).
    pub fn sign_token(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());
        header.x5t = self.x5t.clone();
        self.sign_with_header(&header, claims)
    }

    /// Sign claims with a caller-supplied header.
    ///
    /// Useful for tokens whose `kid` points at a different key, or that omit it.
    pub fn sign_with_header(&self, header: &Header, claims: &serde_json::Value) -> String {
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        encode(header, claims, &encoding_key).expect("Failed to sign token")
    }

    /// Public key as a JWK entry.
    pub fn jwk_json(&self) -> serde_json::Value {
        let mut jwk = serde_json::json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key_bytes),
            "alg": "EdDSA",
            "use": "sig"
        });
        if let Some(x5t) = &self.x5t {
            jwk["x5t"] = serde_json::Value::String(x5t.clone());
        }
        jwk
    }
}

/// Fixed RSA-2048 private key (PKCS#8 PEM), test use only.
const RSA_2048_PRIVATE_KEY_PEM: &str = include_str!("fixtures/rsa_2048.pem");

/// Modulus of [`RSA_2048_PRIVATE_KEY_PEM`], base64url without padding.
const RSA_2048_MODULUS: [&str; 5] = [
    "vYjnrLquq2tfXKv6ZJ4lED6L_yvElRbffQWdnlIP33Z8Hk3T-F4lcqDkvGGZ0ENrIL_SHcA9r5xyLC9F",
    "5uk-N8pCLb8mXri9Q_xKMNbd4YkhVG__U02jOXCv8uopZqFwwr9wRlNuhwEIg_TbVmcR21IGMJxkDuAr",
    "165O39oHTtrxFe1iM4NR2sDe2MebO06BB_on_WwbY4MlA_xF3MwPoH2eF2vKZO43FZgMljVIimLIfgt1",
    "Vq1b9trOeRT0PoIX4_lJcdjdjVgd4esyszf0rjkj7VUDED1QLo-a2IfJn5Rlaecwtw20yJWqSqCvaPRP",
    "-Zdoa5oIS_IsUOBjvhUu_w",
];

/// RS256 keypair bound to a key id, publishing `{kty, kid, alg, n, e}`.
#[derive(Clone)]
pub struct TestRsaKeypair {
    pub kid: String,
}

impl TestRsaKeypair {
    pub fn new(kid: &str) -> Self {
        Self {
            kid: kid.to_string(),
        }
    }

    /// Sign claims with RS256, setting `kid`.
    pub fn sign_token(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());
        let encoding_key = EncodingKey::from_rsa_pem(RSA_2048_PRIVATE_KEY_PEM.as_bytes())
            .expect("Failed to parse RSA test key");
        encode(&header, claims, &encoding_key).expect("Failed to sign token")
    }

    /// Public key as a JWK entry.
    pub fn jwk_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": "RSA",
            "kid": self.kid,
            "alg": "RS256",
            "use": "sig",
            "n": RSA_2048_MODULUS.concat(),
            "e": "AQAB"
        })
    }
}

fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[0] = seed;
    for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }
    seed_bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed.
///
/// ring does not expose a PKCS#8 export for seeded keys, so the DER is
/// assembled by hand (RFC 8410 layout).
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    let mut pkcs8 = Vec::new();

    // Outer SEQUENCE tag
    pkcs8.push(0x30);
    pkcs8.push(0x2e); // Length: 46 bytes

    // Version: INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);

    // Algorithm Identifier: SEQUENCE, OID 1.3.101.112
    pkcs8.push(0x30);
    pkcs8.push(0x05);
    pkcs8.extend_from_slice(&[0x06, 0x03, 0x2b, 0x65, 0x70]);

    // Private Key: OCTET STRING wrapping an OCTET STRING with the seed
    pkcs8.push(0x04);
    pkcs8.push(0x22);
    pkcs8.push(0x04);
    pkcs8.push(0x20);
    pkcs8.extend_from_slice(seed);

    pkcs8
}
