//! Policy input document.

use crate::guard::NormalizedCall;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// The `input` sent to the policy engine.
///
/// ```json
/// {
///   "token": "<jwt>",
///   "httpMethod": "GET",
///   "path": ["users", "42"],
///   "headers": {"authorization": "Bearer <jwt>"},
///   "query": {"expand": ["roles", "groups"]}
/// }
/// ```
#[derive(Clone, PartialEq, Serialize)]
pub struct PolicyInput {
    pub token: String,
    #[serde(rename = "httpMethod")]
    pub http_method: String,
    pub path: Vec<String>,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, Vec<String>>,
}

impl PolicyInput {
    pub fn from_call(token: &str, call: &NormalizedCall) -> Self {
        Self {
            token: token.to_string(),
            http_method: call.method.clone(),
            path: path_segments(&call.path),
            headers: call.headers.clone(),
            query: call.query.clone(),
        }
    }
}

impl fmt::Debug for PolicyInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyInput")
            .field("token", &"[REDACTED]")
            .field("http_method", &self.http_method)
            .field("path", &self.path)
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

/// Request envelope: `{"input": ...}`.
#[derive(Serialize)]
pub(crate) struct PolicyRequest<'a> {
    pub input: &'a PolicyInput,
}

/// Split a path into policy segments.
///
/// The leading `/` is dropped and the rest split on `/`; `""` and `"/"` both
/// yield a single empty segment.
pub fn path_segments(path: &str) -> Vec<String> {
    path.strip_prefix('/')
        .unwrap_or(path)
        .split('/')
        .map(str::to_string)
        .collect()
}

/// Parse a query string into `name -> [values]`, keeping repeated keys in order.
pub fn parse_query(query: Option<&str>) -> BTreeMap<String, Vec<String>> {
    let mut parsed: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if let Some(query) = query {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            parsed
                .entry(name.into_owned())
                .or_default()
                .push(value.into_owned());
        }
    }
    parsed
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::guard::Transport;

    #[test]
    fn test_path_segments() {
        assert_eq!(path_segments("/users/42"), vec!["users", "42"]);
        assert_eq!(path_segments("/a"), vec!["a"]);
        assert_eq!(path_segments("/a/"), vec!["a", ""]);
        assert_eq!(path_segments("/"), vec![""]);
        assert_eq!(path_segments(""), vec![""]);
        assert_eq!(
            path_segments("/test.TestService/Test"),
            vec!["test.TestService", "Test"]
        );
    }

    #[test]
    fn test_parse_query_repeated_keys() {
        let query = parse_query(Some("expand=roles&expand=groups&page=2&empty="));

        assert_eq!(query.get("expand").unwrap(), &vec!["roles", "groups"]);
        assert_eq!(query.get("page").unwrap(), &vec!["2"]);
        assert_eq!(query.get("empty").unwrap(), &vec![""]);
    }

    #[test]
    fn test_parse_query_decodes_values() {
        let query = parse_query(Some("q=a%20b&name=x+y"));

        assert_eq!(query.get("q").unwrap(), &vec!["a b"]);
        assert_eq!(query.get("name").unwrap(), &vec!["x y"]);
    }

    #[test]
    fn test_parse_query_absent() {
        assert!(parse_query(None).is_empty());
        assert!(parse_query(Some("")).is_empty());
    }

    #[test]
    fn test_input_serialization_shape() {
        let call = NormalizedCall {
            transport: Transport::Http,
            method: "GET".to_string(),
            path: "/users/42".to_string(),
            query: parse_query(Some("expand=roles")),
            headers: BTreeMap::from([("x-tenant".to_string(), "t1".to_string())]),
            authorization: Some("Bearer abc".to_string()),
        };

        let input = PolicyInput::from_call("abc", &call);
        let json = serde_json::to_value(PolicyRequest { input: &input }).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "input": {
                    "token": "abc",
                    "httpMethod": "GET",
                    "path": ["users", "42"],
                    "headers": {"x-tenant": "t1"},
                    "query": {"expand": ["roles"]}
                }
            })
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let call = NormalizedCall {
            transport: Transport::Http,
            method: "GET".to_string(),
            path: "/".to_string(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            authorization: None,
        };
        let input = PolicyInput::from_call("secret-token", &call);

        assert!(!format!("{input:?}").contains("secret-token"));
    }
}
