//! JWT utilities shared across the guard crates.
//!
//! This module provides:
//! - Size limits for DoS prevention
//! - Clock skew constants for `exp`/`nbf` leeway
//! - Unverified header inspection (`kid`, `x5t`, `alg`) used to select a
//!   verification key
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Header inspection does NOT verify anything; the token must still be
//!   verified with the key selected from a trusted key set
//! - Generic error messages prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::inspect_header;
//!
//! let header = inspect_header(token)?;
//! let key = loader.resolve(&header.kid, header.x5t.as_deref()).await;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical access tokens are well under 2KB even with RSA signatures and a
/// handful of custom claims. Oversized tokens are rejected before any base64
/// decoding or signature work happens.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (5 minutes).
///
/// Applied as leeway to `exp` and `nbf` when the token carries them.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// Prevents misconfiguration from turning expiry checks into a formality.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting a JWT header.
///
/// Note: Error messages are intentionally generic to prevent information leakage.
/// Detailed information is logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token is missing required `kid` header.
    #[error("The access token is invalid or expired")]
    MissingKid,
}

// =============================================================================
// Header Types
// =============================================================================

/// Key selection fields read from an unverified JWT header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Key ID. Always present and non-empty.
    pub kid: String,

    /// X.509 certificate SHA-1 thumbprint, when the issuer sets one.
    pub x5t: Option<String>,

    /// Declared signature algorithm (e.g. `RS256`, `EdDSA`).
    pub alg: Option<String>,
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    kid: Option<serde_json::Value>,
    #[serde(default)]
    x5t: Option<serde_json::Value>,
    #[serde(default)]
    alg: Option<serde_json::Value>,
}

// =============================================================================
// Functions
// =============================================================================

/// Read `kid`, `x5t` and `alg` from a JWT header without verifying the signature.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing (denial-of-service prevention)
/// - This function does NOT validate the token signature
/// - The returned values should only be used for key lookup in a trusted key set
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - Wrong structure, bad base64 or invalid JSON header
/// - `MissingKid` - Header has no `kid`, or `kid` is empty or not a string
pub fn inspect_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let mut parts = token.split('.');
    let (Some(header_part), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let kid = non_empty_string(header.kid).ok_or(JwtValidationError::MissingKid)?;

    Ok(TokenHeader {
        kid,
        x5t: non_empty_string(header.x5t),
        alg: non_empty_string(header.alg),
    })
}

fn non_empty_string(value: Option<serde_json::Value>) -> Option<String> {
    match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}
