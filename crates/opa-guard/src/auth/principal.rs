//! Principal records attached to admitted calls.

use axum::http::{Extensions, Request};
use serde_json::{Map, Value};
use std::fmt;

/// Verified JWT payload.
pub type Claims = Map<String, Value>;

/// Policy `result` object, including its `allow` key.
pub type Constraints = Map<String, Value>;

/// Outcome of token verification: the raw token and its verified claims.
#[derive(Clone, PartialEq)]
pub struct JwtPrincipal {
    pub token: String,
    pub claims: Claims,
}

/// Token, verified claims and the policy constraints of an admitted call.
///
/// `constraints` is empty when policy evaluation is disabled.
#[derive(Clone, PartialEq)]
pub struct OpaJwtPrincipal {
    pub token: String,
    pub claims: Claims,
    pub constraints: Constraints,
}

impl OpaJwtPrincipal {
    pub fn new(principal: JwtPrincipal, constraints: Constraints) -> Self {
        Self {
            token: principal.token,
            claims: principal.claims,
            constraints,
        }
    }

    /// The authentication half of this record.
    pub fn jwt_principal(&self) -> JwtPrincipal {
        JwtPrincipal {
            token: self.token.clone(),
            claims: self.claims.clone(),
        }
    }
}

impl fmt::Debug for JwtPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtPrincipal")
            .field("token", &"[REDACTED]")
            .field("claims", &self.claims)
            .finish()
    }
}

impl fmt::Debug for OpaJwtPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaJwtPrincipal")
            .field("token", &"[REDACTED]")
            .field("claims", &self.claims)
            .field("constraints", &self.constraints)
            .finish()
    }
}

/// Read the principals the guard attached to a request.
///
/// Both return `None` when the guard was not applied or was bypassed.
pub trait PrincipalExt {
    fn jwt_principal(&self) -> Option<&JwtPrincipal>;

    fn opa_principal(&self) -> Option<&OpaJwtPrincipal>;
}

impl PrincipalExt for Extensions {
    fn jwt_principal(&self) -> Option<&JwtPrincipal> {
        self.get::<JwtPrincipal>()
    }

    fn opa_principal(&self) -> Option<&OpaJwtPrincipal> {
        self.get::<OpaJwtPrincipal>()
    }
}

impl<B> PrincipalExt for Request<B> {
    fn jwt_principal(&self) -> Option<&JwtPrincipal> {
        self.extensions().jwt_principal()
    }

    fn opa_principal(&self) -> Option<&OpaJwtPrincipal> {
        self.extensions().opa_principal()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn principal() -> JwtPrincipal {
        JwtPrincipal {
            token: "secret.token.value".to_string(),
            claims: json!({"sub": "alice"}).as_object().unwrap().clone(),
        }
    }

    #[test]
    fn test_debug_redacts_token() {
        let jwt = principal();
        let opa = OpaJwtPrincipal::new(jwt.clone(), Constraints::new());

        for debug in [format!("{jwt:?}"), format!("{opa:?}")] {
            assert!(debug.contains("[REDACTED]"));
            assert!(!debug.contains("secret.token.value"));
            assert!(debug.contains("alice"));
        }
    }

    #[test]
    fn test_opa_principal_round_trips_jwt_half() {
        let constraints = json!({"allow": true}).as_object().unwrap().clone();
        let opa = OpaJwtPrincipal::new(principal(), constraints.clone());

        assert_eq!(opa.jwt_principal(), principal());
        assert_eq!(opa.constraints, constraints);
    }

    #[test]
    fn test_principal_ext_on_request() {
        let mut request = Request::builder().body(()).unwrap();
        assert!(request.jwt_principal().is_none());
        assert!(request.opa_principal().is_none());

        let opa = OpaJwtPrincipal::new(principal(), Constraints::new());
        request.extensions_mut().insert(opa.jwt_principal());
        request.extensions_mut().insert(opa.clone());

        assert_eq!(request.jwt_principal().unwrap().claims["sub"], "alice");
        assert_eq!(request.opa_principal(), Some(&opa));
    }
}
