//! HTTP request handlers for the guard host.

pub mod health;
pub mod metrics;
pub mod principal;

pub use health::health_check;
pub use metrics::metrics_handler;
pub use principal::echo_principal;
