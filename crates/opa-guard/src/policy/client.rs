//! Open Policy Agent client.
//!
//! Posts the policy input to `<base>/v1/data/<package>` and enforces the
//! `allow` flag of the returned `result`. The whole `result` object, `allow`
//! included, becomes the call's constraints.

use super::input::{PolicyInput, PolicyRequest};
use crate::auth::{Constraints, JwtPrincipal, OpaJwtPrincipal};
use crate::errors::GuardError;
use crate::guard::NormalizedCall;
use crate::observability::metrics;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Default policy call timeout (500ms).
pub const DEFAULT_POLICY_TIMEOUT: Duration = Duration::from_millis(500);

/// Policy client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Policy engine base URL (e.g. `http://localhost:8181`).
    pub base_url: String,

    /// Policy package, dot or slash separated (e.g. `httpapi.authz`).
    pub package: String,

    /// Timeout for one policy call.
    pub timeout: Duration,

    /// Skip evaluation and allow every authenticated call.
    pub disabled: bool,
}

impl PolicyConfig {
    /// `<base>/v1/data/<package with dots replaced by slashes>`.
    pub fn decision_url(&self) -> String {
        let package = self.package.trim_matches('/').replace('.', "/");
        format!("{}/v1/data/{}", self.base_url.trim_end_matches('/'), package)
    }
}

#[derive(Deserialize)]
struct PolicyResponse {
    #[serde(default)]
    result: Option<Value>,
}

/// Client for one policy package.
pub struct PolicyClient {
    config: PolicyConfig,
    decision_url: String,
    http: reqwest::Client,
}

impl PolicyClient {
    pub fn new(config: PolicyConfig, http: reqwest::Client) -> Self {
        let decision_url = config.decision_url();
        Self {
            config,
            decision_url,
            http,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.config.disabled
    }

    pub fn decision_url(&self) -> &str {
        &self.decision_url
    }

    /// Authorize an authenticated call and combine the decision with its principal.
    ///
    /// When evaluation is disabled the principal is returned with empty
    /// constraints and no request is made.
    ///
    /// # Errors
    ///
    /// See [`PolicyClient::evaluate`].
    #[instrument(skip_all, fields(method = %call.method))]
    pub async fn authorize(
        &self,
        principal: JwtPrincipal,
        call: &NormalizedCall,
    ) -> Result<OpaJwtPrincipal, GuardError> {
        if self.config.disabled {
            return Ok(OpaJwtPrincipal::new(principal, Constraints::new()));
        }

        let input = PolicyInput::from_call(&principal.token, call);
        let constraints = self.evaluate(&input).await?;
        Ok(OpaJwtPrincipal::new(principal, constraints))
    }

    /// Evaluate `input` and return the decision's `result` object.
    ///
    /// # Errors
    ///
    /// - `GuardError::PolicyUnavailable` - transport failure, timeout or non-2xx status
    /// - `GuardError::PolicyResultMissing` - body is not JSON or has no `result` object
    /// - `GuardError::PolicyForbidden` - `result.allow` is not `true`
    pub async fn evaluate(&self, input: &PolicyInput) -> Result<Constraints, GuardError> {
        if self.config.disabled {
            return Ok(Constraints::new());
        }

        let start = Instant::now();
        let outcome = self.post_decision(input).await;
        let status = match &outcome {
            Ok(_) => "allowed",
            Err(GuardError::PolicyForbidden) => "forbidden",
            Err(GuardError::PolicyResultMissing(_)) => "result_missing",
            Err(_) => "unavailable",
        };
        metrics::record_policy_request(status, start.elapsed());
        outcome
    }

    async fn post_decision(&self, input: &PolicyInput) -> Result<Constraints, GuardError> {
        let response = self
            .http
            .post(&self.decision_url)
            .timeout(self.config.timeout)
            .json(&PolicyRequest { input })
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "guard.policy", url = %self.decision_url, error = %e, "Policy request failed");
                GuardError::PolicyUnavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(target: "guard.policy", url = %self.decision_url, status = %status, "Policy engine returned error");
            return Err(GuardError::PolicyUnavailable(format!("HTTP {status}")));
        }

        let body = response.bytes().await.map_err(|e| {
            tracing::warn!(target: "guard.policy", error = %e, "Failed to read policy response");
            GuardError::PolicyUnavailable(e.to_string())
        })?;

        let decision: PolicyResponse = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(target: "guard.policy", error = %e, "Policy response is not valid JSON");
            GuardError::PolicyResultMissing(e.to_string())
        })?;

        let result = match decision.result {
            Some(Value::Object(result)) => result,
            Some(_) => {
                return Err(GuardError::PolicyResultMissing(
                    "result is not an object".to_string(),
                ))
            }
            None => {
                tracing::warn!(
                    target: "guard.policy",
                    url = %self.decision_url,
                    "Policy response has no result, is the package loaded?"
                );
                return Err(GuardError::PolicyResultMissing("no result".to_string()));
            }
        };

        if result.get("allow") != Some(&Value::Bool(true)) {
            tracing::debug!(target: "guard.policy", "Policy denied the request");
            return Err(GuardError::PolicyForbidden);
        }

        Ok(result)
    }
}
