//! Axum middleware adapter.
//!
//! ```rust,ignore
//! let protected = Router::new()
//!     .route("/users/:id", get(get_user))
//!     .layer(middleware::from_fn_with_state(guard, require_authorization));
//! ```

use super::{CallContext, RequestGuard};
use crate::errors::Denied;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::instrument;

/// Admit or reject an HTTP request.
///
/// Admitted requests continue with the principals in their extensions (see
/// [`PrincipalExt`](crate::auth::PrincipalExt)). Rejected requests get `403`
/// with a generic body.
#[instrument(skip(guard, req, next), name = "guard.http")]
pub async fn require_authorization(
    State(guard): State<Arc<RequestGuard>>,
    mut req: Request,
    next: Next,
) -> Result<Response, Denied> {
    let admission = guard
        .check(CallContext::Http {
            method: req.method(),
            uri: req.uri(),
            headers: req.headers(),
        })
        .await
        .inspect_err(|_| {
            tracing::debug!(target: "guard.http", path = %req.uri().path(), "Rejecting HTTP request");
        })?;

    admission.attach(req.extensions_mut());

    Ok(next.run(req).await)
}
