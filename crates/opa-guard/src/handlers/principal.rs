//! Guarded catch-all handler.

use crate::auth::PrincipalExt;
use axum::{extract::Request, Json};
use serde_json::{json, Value};

/// Echo what the guard attached to the request.
///
/// Returns `{"claims": ..., "constraints": ...}` for an admitted call and
/// `{"bypassed": true}` when authentication is disabled.
pub async fn echo_principal(req: Request) -> Json<Value> {
    let body = match req.opa_principal() {
        Some(principal) => json!({
            "claims": principal.claims,
            "constraints": principal.constraints,
        }),
        None => json!({ "bypassed": true }),
    };
    Json(body)
}
