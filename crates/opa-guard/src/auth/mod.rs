//! Token verification.
//!
//! - [`JwtVerifier`] - resolves the signing key and verifies a bearer token
//! - [`JwtPrincipal`] / [`OpaJwtPrincipal`] - records attached to admitted calls
//! - [`PrincipalExt`] - read-side accessor for handlers

mod principal;
mod verifier;

pub use principal::{Claims, Constraints, JwtPrincipal, OpaJwtPrincipal, PrincipalExt};
pub use verifier::JwtVerifier;
