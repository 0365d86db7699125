//! Common utilities shared across the OPA guard crates.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (size limits, clock skew, unverified header inspection)
pub mod jwt;
