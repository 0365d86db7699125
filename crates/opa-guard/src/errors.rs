//! Guard error types.
//!
//! `GuardError` is the detailed failure taxonomy of the verification
//! pipeline. It is logged but never shown to callers: every variant collapses
//! into [`Denied`], which renders a fixed `403 Forbidden` body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Generic message for every token failure.
pub const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// Failures of the authentication and authorization stages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// No `Authorization: Bearer <token>` on the call.
    #[error("Missing or malformed authorization")]
    MissingCredentials,

    /// Token could not be decoded, has no `kid`, or failed verification.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// No key resolved for the token even after a reload.
    #[error("No public key found for kid '{kid}'")]
    NoPublicKey { kid: String },

    /// Policy endpoint unreachable, timed out, or answered with a non-2xx status.
    #[error("Policy engine unavailable: {0}")]
    PolicyUnavailable(String),

    /// Policy endpoint answered but without a usable `result`.
    #[error("Policy result missing: {0}")]
    PolicyResultMissing(String),

    /// Policy result's `allow` is not `true`.
    #[error("Policy denied the request")]
    PolicyForbidden,
}

impl GuardError {
    /// Bounded label used for the `reason` metric dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            GuardError::MissingCredentials => "missing_credentials",
            GuardError::InvalidToken(_) => "invalid_token",
            GuardError::NoPublicKey { .. } => "no_public_key",
            GuardError::PolicyUnavailable(_) => "policy_unavailable",
            GuardError::PolicyResultMissing(_) => "policy_result_missing",
            GuardError::PolicyForbidden => "policy_forbidden",
        }
    }

    /// Whether the failure points at an unhealthy collaborator rather than a bad caller.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            GuardError::PolicyUnavailable(_) | GuardError::PolicyResultMissing(_)
        )
    }

    pub(crate) fn invalid_token() -> Self {
        GuardError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string())
    }
}

/// Opaque rejection returned to the dispatching framework.
///
/// Carries no reason so callers learn nothing about which stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Denied;

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for Denied {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorDetail {
                code: "FORBIDDEN",
                message: "Access denied",
            },
        };
        (StatusCode::FORBIDDEN, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            GuardError::invalid_token().to_string(),
            "Invalid token: The access token is invalid or expired"
        );
        assert_eq!(
            GuardError::NoPublicKey {
                kid: "k1".to_string()
            }
            .to_string(),
            "No public key found for kid 'k1'"
        );
        assert_eq!(
            GuardError::PolicyForbidden.to_string(),
            "Policy denied the request"
        );
    }

    #[test]
    fn test_reason_labels_are_distinct() {
        let errors = [
            GuardError::MissingCredentials,
            GuardError::invalid_token(),
            GuardError::NoPublicKey { kid: "k".into() },
            GuardError::PolicyUnavailable("x".into()),
            GuardError::PolicyResultMissing("x".into()),
            GuardError::PolicyForbidden,
        ];
        let reasons: std::collections::HashSet<_> = errors.iter().map(|e| e.reason()).collect();
        assert_eq!(reasons.len(), errors.len());
    }

    #[test]
    fn test_infrastructure_classification() {
        assert!(GuardError::PolicyUnavailable("timeout".into()).is_infrastructure());
        assert!(GuardError::PolicyResultMissing("no result".into()).is_infrastructure());
        assert!(!GuardError::PolicyForbidden.is_infrastructure());
        assert!(!GuardError::MissingCredentials.is_infrastructure());
    }

    #[tokio::test]
    async fn test_denied_renders_fixed_forbidden_body() {
        let response = Denied.into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "FORBIDDEN");
        assert_eq!(body["error"]["message"], "Access denied");
    }
}
