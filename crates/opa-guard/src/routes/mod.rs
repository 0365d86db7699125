//! HTTP routes for the guard host.
//!
//! Defines the Axum router and application state.

use crate::guard::{http::require_authorization, RequestGuard};
use crate::handlers;
use crate::keys::PublicKeyLoader;
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub guard: Arc<RequestGuard>,

    /// Key cache, read for health reporting.
    pub loader: Arc<PublicKeyLoader>,

    /// Prometheus metrics handle for rendering metrics.
    pub metrics_handle: PrometheusHandle,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Unguarded liveness with key counts
/// - `/metrics` - Unguarded Prometheus scrape endpoint
/// - every other path - Guarded, echoes the attached principal
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>) -> Router {
    let guarded = Router::new()
        .fallback(handlers::echo_principal)
        .layer(middleware::from_fn_with_state(
            state.guard.clone(),
            require_authorization,
        ));

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    public_routes
        .fallback_service(guarded)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
