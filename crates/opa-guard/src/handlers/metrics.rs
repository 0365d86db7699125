//! Prometheus metrics endpoint handler.
//!
//! # Security
//!
//! This endpoint is unauthenticated to allow Prometheus to scrape metrics.
//! Labels are bounded and never carry tokens or claims.

use crate::routes::AppState;
use axum::{extract::State, response::IntoResponse};
use std::sync::Arc;

/// Handler for GET /metrics
///
/// Returns Prometheus text format:
/// ```text
/// # TYPE guard_decisions_total counter
/// guard_decisions_total{transport="http",outcome="denied",reason="invalid_token"} 3
/// ```
#[tracing::instrument(skip_all, name = "guard.metrics.scrape")]
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics_handle.render()
}
