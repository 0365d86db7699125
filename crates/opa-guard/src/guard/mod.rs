//! Request guard.
//!
//! Runs bearer extraction, token verification and policy evaluation for one
//! inbound call and decides whether it is admitted. Transport adapters live
//! in [`http`] and [`grpc`].

mod context;
pub mod grpc;
pub mod http;

pub use context::{
    flatten_headers, strip_context_path, CallContext, NormalizedCall, Transport,
};

use crate::auth::{JwtVerifier, OpaJwtPrincipal};
use crate::errors::{Denied, GuardError};
use crate::observability::metrics;
use crate::policy::PolicyClient;
use axum::http::Extensions;
use std::sync::Arc;
use tracing::instrument;

/// Guard settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    /// Admit every call without looking at it.
    pub disable_auth: bool,

    /// Prefix stripped from HTTP paths before policy evaluation.
    pub context_path: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            disable_auth: false,
            context_path: "/".to_string(),
        }
    }
}

/// Outcome of an admitted call.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Authentication is disabled; nothing was checked.
    Bypassed,
    /// Token verified and policy allowed the call.
    Authorized(OpaJwtPrincipal),
}

impl Admission {
    pub fn principal(&self) -> Option<&OpaJwtPrincipal> {
        match self {
            Admission::Bypassed => None,
            Admission::Authorized(principal) => Some(principal),
        }
    }

    /// Store the principals for downstream handlers.
    ///
    /// Inserts both the [`OpaJwtPrincipal`] and its
    /// [`JwtPrincipal`](crate::auth::JwtPrincipal) half. A bypassed call
    /// attaches nothing.
    pub fn attach(self, extensions: &mut Extensions) {
        if let Admission::Authorized(principal) = self {
            extensions.insert(principal.jwt_principal());
            extensions.insert(principal);
        }
    }
}

/// Per-call authentication and authorization.
pub struct RequestGuard {
    config: GuardConfig,
    verifier: Arc<JwtVerifier>,
    policy: Arc<PolicyClient>,
}

impl RequestGuard {
    pub fn new(config: GuardConfig, verifier: Arc<JwtVerifier>, policy: Arc<PolicyClient>) -> Self {
        for warning in bypass_warnings(&config, policy.is_disabled()) {
            tracing::warn!(target: "guard.request", "{}", warning);
        }

        Self {
            config,
            verifier,
            policy,
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Decide a call and record the decision.
    ///
    /// The detailed failure is logged; the caller only gets [`Denied`].
    #[instrument(skip_all, fields(transport = %ctx.transport()))]
    pub async fn check(&self, ctx: CallContext<'_>) -> Result<Admission, Denied> {
        let transport = ctx.transport();

        match self.evaluate(ctx).await {
            Ok(Admission::Bypassed) => {
                metrics::record_decision(transport.as_str(), "bypassed", "bypassed");
                Ok(Admission::Bypassed)
            }
            Ok(admission) => {
                metrics::record_decision(transport.as_str(), "admitted", "admitted");
                tracing::debug!(target: "guard.request", "Call admitted");
                Ok(admission)
            }
            Err(e) => {
                if e.is_infrastructure() {
                    tracing::warn!(target: "guard.request", error = %e, "Call denied, policy engine failed");
                } else {
                    tracing::debug!(target: "guard.request", error = %e, "Call denied");
                }
                metrics::record_decision(transport.as_str(), "denied", e.reason());
                Err(Denied)
            }
        }
    }

    /// Decide a call, returning the detailed failure.
    ///
    /// # Errors
    ///
    /// - `GuardError::MissingCredentials` - no `Authorization: Bearer <token>`;
    ///   neither the key cache nor the policy engine is consulted
    /// - any error of [`JwtVerifier::authenticate`]; the policy engine is not
    ///   consulted
    /// - any error of [`PolicyClient::authorize`]
    pub async fn evaluate(&self, ctx: CallContext<'_>) -> Result<Admission, GuardError> {
        if self.config.disable_auth {
            return Ok(Admission::Bypassed);
        }

        let call = ctx.normalize(&self.config.context_path);
        let token = call.bearer_token().ok_or(GuardError::MissingCredentials)?;

        let principal = self.verifier.authenticate(token).await?;
        let principal = self.policy.authorize(principal, &call).await?;

        Ok(Admission::Authorized(principal))
    }
}

/// Startup warnings for each configured bypass.
fn bypass_warnings(config: &GuardConfig, policy_disabled: bool) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if config.disable_auth {
        warnings.push("Authentication is disabled, every call will be admitted");
    }
    if policy_disabled {
        warnings.push("Policy evaluation is disabled, every authenticated call will be admitted");
    }
    warnings
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::{JwtPrincipal, PrincipalExt};
    use crate::keys::{JwksKeySource, PublicKeyLoader};
    use crate::policy::{PolicyConfig, DEFAULT_POLICY_TIMEOUT};
    use axum::http::{HeaderMap, HeaderValue, Method, Uri};
    use guard_test_utils::{
        jwks_mock, opa_decision_mock, opa_input_mock, MockServer, TestClaimsBuilder, TestKeypair,
        JWKS_PATH,
    };
    use serde_json::{json, Value};
    use std::time::Duration;

    const PACKAGE_PATH: &str = "httpapi/authz";

    struct Fixture {
        server: MockServer,
        keypair: TestKeypair,
    }

    impl Fixture {
        async fn start() -> Self {
            Self {
                server: MockServer::start().await,
                keypair: TestKeypair::new(1, "guard-key-01"),
            }
        }

        async fn mount_jwks(&self, expected_calls: u64) {
            jwks_mock(JWKS_PATH, &[self.keypair.jwk_json()])
                .expect(expected_calls)
                .mount(&self.server)
                .await;
        }

        async fn guard(&self, config: GuardConfig, policy_disabled: bool) -> RequestGuard {
            let loader = Arc::new(PublicKeyLoader::new());
            loader
                .register_source(Arc::new(JwksKeySource::new(
                    format!("{}{}", self.server.uri(), JWKS_PATH),
                    String::new(),
                    reqwest::Client::new(),
                )))
                .await
                .unwrap();

            let verifier = Arc::new(JwtVerifier::new(loader, Duration::from_secs(60)));
            let policy = Arc::new(PolicyClient::new(
                PolicyConfig {
                    base_url: self.server.uri(),
                    package: "httpapi.authz".to_string(),
                    timeout: DEFAULT_POLICY_TIMEOUT,
                    disabled: policy_disabled,
                },
                reqwest::Client::new(),
            ));

            RequestGuard::new(config, verifier, policy)
        }

        fn token(&self) -> String {
            self.keypair
                .sign_token(&TestClaimsBuilder::new().subject("alice").build())
        }
    }

    fn bearer_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_bypass_warnings_are_independent() {
        let both = GuardConfig {
            disable_auth: true,
            context_path: "/".to_string(),
        };

        assert_eq!(bypass_warnings(&both, true).len(), 2);
        assert_eq!(bypass_warnings(&both, false).len(), 1);
        assert_eq!(bypass_warnings(&GuardConfig::default(), true).len(), 1);
        assert!(bypass_warnings(&GuardConfig::default(), false).is_empty());
    }

    #[tokio::test]
    async fn test_admits_call_allowed_by_policy() {
        let fixture = Fixture::start().await;
        fixture.mount_jwks(1).await;
        opa_input_mock(
            PACKAGE_PATH,
            json!({"httpMethod": "GET", "path": ["users", "42"]}),
            json!({"allow": true, "a": 1}),
        )
        .expect(1)
        .mount(&fixture.server)
        .await;
        let guard = fixture
            .guard(
                GuardConfig {
                    disable_auth: false,
                    context_path: "/api".to_string(),
                },
                false,
            )
            .await;

        let headers = bearer_headers(&fixture.token());
        let uri = Uri::from_static("/api/users/42");
        let admission = guard
            .check(CallContext::Http {
                method: &Method::GET,
                uri: &uri,
                headers: &headers,
            })
            .await
            .unwrap();

        let principal = admission.principal().unwrap();
        assert_eq!(principal.claims["sub"], "alice");
        assert_eq!(
            Value::Object(principal.constraints.clone()),
            json!({"allow": true, "a": 1})
        );
    }

    #[tokio::test]
    async fn test_missing_credentials_skip_keys_and_policy() {
        let fixture = Fixture::start().await;
        // Registration only: the missing header must not trigger a reload.
        fixture.mount_jwks(1).await;
        opa_decision_mock(PACKAGE_PATH, json!({"allow": true}))
            .expect(0)
            .mount(&fixture.server)
            .await;
        let guard = fixture.guard(GuardConfig::default(), false).await;

        let headers = HeaderMap::new();
        let result = guard
            .evaluate(CallContext::Http {
                method: &Method::GET,
                uri: &Uri::from_static("/"),
                headers: &headers,
            })
            .await;

        assert_eq!(result, Err(GuardError::MissingCredentials));
    }

    #[tokio::test]
    async fn test_invalid_token_skips_policy() {
        let fixture = Fixture::start().await;
        fixture.mount_jwks(1).await;
        opa_decision_mock(PACKAGE_PATH, json!({"allow": true}))
            .expect(0)
            .mount(&fixture.server)
            .await;
        let guard = fixture.guard(GuardConfig::default(), false).await;

        let headers = bearer_headers("not-a-jwt");
        let result = guard
            .check(CallContext::Http {
                method: &Method::GET,
                uri: &Uri::from_static("/"),
                headers: &headers,
            })
            .await;

        assert_eq!(result, Err(Denied));
    }

    #[tokio::test]
    async fn test_policy_forbidden_is_denied() {
        let fixture = Fixture::start().await;
        fixture.mount_jwks(1).await;
        opa_decision_mock(PACKAGE_PATH, json!({"allow": false}))
            .expect(1)
            .mount(&fixture.server)
            .await;
        let guard = fixture.guard(GuardConfig::default(), false).await;

        let headers = bearer_headers(&fixture.token());
        let result = guard
            .evaluate(CallContext::Http {
                method: &Method::DELETE,
                uri: &Uri::from_static("/users/42"),
                headers: &headers,
            })
            .await;

        assert_eq!(result, Err(GuardError::PolicyForbidden));
    }

    #[tokio::test]
    async fn test_disabled_auth_bypasses_everything() {
        let fixture = Fixture::start().await;
        fixture.mount_jwks(1).await;
        opa_decision_mock(PACKAGE_PATH, json!({"allow": true}))
            .expect(0)
            .mount(&fixture.server)
            .await;
        let guard = fixture
            .guard(
                GuardConfig {
                    disable_auth: true,
                    context_path: "/".to_string(),
                },
                false,
            )
            .await;

        let headers = HeaderMap::new();
        let admission = guard
            .check(CallContext::Http {
                method: &Method::GET,
                uri: &Uri::from_static("/anything"),
                headers: &headers,
            })
            .await
            .unwrap();

        assert_eq!(admission, Admission::Bypassed);
        let mut extensions = Extensions::new();
        admission.attach(&mut extensions);
        assert!(extensions.opa_principal().is_none());
    }

    #[tokio::test]
    async fn test_disabled_policy_admits_with_empty_constraints() {
        let fixture = Fixture::start().await;
        fixture.mount_jwks(1).await;
        opa_decision_mock(PACKAGE_PATH, json!({"allow": false}))
            .expect(0)
            .mount(&fixture.server)
            .await;
        let guard = fixture.guard(GuardConfig::default(), true).await;

        let headers = bearer_headers(&fixture.token());
        let admission = guard
            .check(CallContext::Rpc {
                uri: &Uri::from_static("/test.TestService/Test"),
                metadata: &headers,
            })
            .await
            .unwrap();

        let principal = admission.principal().unwrap();
        assert!(principal.constraints.is_empty());
        assert_eq!(principal.claims["sub"], "alice");
    }

    #[test]
    fn test_attach_inserts_both_principals() {
        let jwt = JwtPrincipal {
            token: "t".to_string(),
            claims: json!({"sub": "bob"}).as_object().unwrap().clone(),
        };
        let opa = OpaJwtPrincipal::new(jwt.clone(), Default::default());
        let mut extensions = Extensions::new();

        Admission::Authorized(opa.clone()).attach(&mut extensions);

        assert_eq!(extensions.jwt_principal(), Some(&jwt));
        assert_eq!(extensions.opa_principal(), Some(&opa));
    }

    #[test]
    fn test_guard_config_default() {
        let config = GuardConfig::default();
        assert!(!config.disable_auth);
        assert_eq!(config.context_path, "/");
    }
}
