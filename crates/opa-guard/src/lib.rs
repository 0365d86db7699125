//! OPA Guard Library
//!
//! An authentication and authorization pipeline placed in front of HTTP and
//! gRPC handlers:
//!
//! - Verifies bearer tokens against public keys loaded from JWKS endpoints
//!   and OpenID discovery documents
//! - Delegates the allow/deny decision to an Open Policy Agent endpoint
//! - Attaches the verified claims and the policy constraints to the request
//!
//! # Architecture
//!
//! ```text
//! guard (http / grpc adapters) -> auth::JwtVerifier -> keys::PublicKeyLoader -> keys::KeySource
//!                              -> policy::PolicyClient -> OPA
//! ```
//!
//! # Modules
//!
//! - `config` - Configuration from environment
//! - `errors` - Failure taxonomy and the opaque `Denied` rejection
//! - `keys` - Key sources and the swappable key cache
//! - `auth` - Token verification and principal types
//! - `policy` - Policy input construction and the OPA client
//! - `guard` - Per-call orchestration and transport adapters
//! - `observability` - Metrics
//! - `routes` / `handlers` - The binary host's router

pub mod auth;
pub mod config;
pub mod errors;
pub mod guard;
pub mod handlers;
pub mod keys;
pub mod observability;
pub mod policy;
pub mod routes;
