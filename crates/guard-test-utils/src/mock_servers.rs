//! Wiremock helpers for the HTTP collaborators of the guard.
//!
//! Each `*_mock` function returns an unmounted [`Mock`] so callers can add
//! call-count expectations before mounting; the `mount_*` helpers are
//! shortcuts for the common case.

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Conventional JWKS path served by the mock key server.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// OpenID discovery document path.
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// GET `path` returning `{"keys": keys}`.
pub fn jwks_mock(jwks_path: &str, keys: &[Value]) -> Mock {
    Mock::given(method("GET"))
        .and(path(jwks_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
}

/// Mount a JWKS document on `server` at `jwks_path`.
pub async fn mount_jwks(server: &MockServer, jwks_path: &str, keys: &[Value]) {
    jwks_mock(jwks_path, keys).mount(server).await;
}

/// GET discovery document pointing at `jwks_uri`.
pub fn discovery_mock(issuer: &str, jwks_uri: &str) -> Mock {
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": issuer,
            "jwks_uri": jwks_uri,
        })))
}

/// Mount a discovery document on `server` whose JWKS lives on the same server.
pub async fn mount_discovery(server: &MockServer) {
    discovery_mock(&server.uri(), &format!("{}{}", server.uri(), JWKS_PATH))
        .mount(server)
        .await;
}

/// POST decision endpoint for `package_path` (slash separated) returning
/// `{"result": result}`.
pub fn opa_decision_mock(package_path: &str, result: Value) -> Mock {
    opa_raw_mock(package_path, ResponseTemplate::new(200).set_body_json(json!({ "result": result })))
}

/// POST decision endpoint for `package_path` with an arbitrary response.
pub fn opa_raw_mock(package_path: &str, response: ResponseTemplate) -> Mock {
    Mock::given(method("POST"))
        .and(path(format!("/v1/data/{package_path}")))
        .and(header("content-type", "application/json"))
        .respond_with(response)
}

/// POST decision endpoint for `package_path` that only matches requests whose
/// `input` document contains `input`, returning `{"result": result}`.
pub fn opa_input_mock(package_path: &str, input: Value, result: Value) -> Mock {
    Mock::given(method("POST"))
        .and(path(format!("/v1/data/{package_path}")))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({ "input": input })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": result })))
}

/// Mount an allow decision carrying `constraints` merged with `"allow": true`.
pub async fn mount_opa_allow(server: &MockServer, package_path: &str, constraints: Value) {
    let mut result = match constraints {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    result.insert("allow".to_string(), Value::Bool(true));
    opa_decision_mock(package_path, Value::Object(result))
        .mount(server)
        .await;
}
