//! # Guard Test Utilities
//!
//! Shared test utilities for the OPA guard crates.
//!
//! This crate provides:
//! - Deterministic Ed25519 key fixtures (`TestKeypair`)
//! - Claim builders (`TestClaimsBuilder`)
//! - Wiremock helpers for JWKS, discovery and policy endpoints
//!
//! ## Usage
//!
//! ```rust,ignore
//! use guard_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let server = MockServer::start().await;
//!     let keypair = TestKeypair::new(1, "test-key-01");
//!     mount_jwks(&server, JWKS_PATH, &[keypair.jwk_json()]).await;
//!
//!     let token = keypair.sign_token(&TestClaimsBuilder::new().subject("alice").build());
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_servers;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_servers::*;
pub use token_builders::*;

pub use wiremock::MockServer;
