//! Health check handler.

use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Liveness payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// Keys in the current index.
    pub loaded_keys: usize,
    pub key_sources: usize,
}

/// Health check handler.
///
/// Always reports `healthy`; the key counts tell an operator whether the
/// last reload found anything. Not guarded.
///
/// ```json
/// {
///   "status": "healthy",
///   "loaded_keys": 2,
///   "key_sources": 1
/// }
/// ```
#[instrument(skip_all, name = "guard.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        loaded_keys: state.loader.key_count(),
        key_sources: state.loader.source_count(),
    })
}
