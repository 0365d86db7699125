//! Observability module for the guard.
//!
//! Provides metrics definitions and the Prometheus recorder setup.

pub mod metrics;
