//! Transport-neutral view of an inbound call.

use crate::policy::parse_query;
use axum::http::{HeaderMap, Method, Uri};
use std::collections::BTreeMap;
use std::fmt;

/// Transport an inbound call arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    Grpc,
}

impl Transport {
    /// Label used for logs and the `transport` metric dimension.
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Http => "http",
            Transport::Grpc => "grpc",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Borrowed call metadata handed to the guard by a transport adapter.
#[derive(Debug, Clone, Copy)]
pub enum CallContext<'a> {
    /// Plain HTTP request.
    Http {
        method: &'a Method,
        uri: &'a Uri,
        headers: &'a HeaderMap,
    },
    /// gRPC call. The URI path is `/<package.Service>/<Method>`.
    Rpc {
        uri: &'a Uri,
        metadata: &'a HeaderMap,
    },
}

impl CallContext<'_> {
    pub fn transport(&self) -> Transport {
        match self {
            CallContext::Http { .. } => Transport::Http,
            CallContext::Rpc { .. } => Transport::Grpc,
        }
    }

    /// Reduce the call to the fields policy evaluation needs.
    ///
    /// HTTP paths are stripped of `context_path`. RPC calls always report
    /// method `POST`, their full path and no query.
    pub fn normalize(&self, context_path: &str) -> NormalizedCall {
        match *self {
            CallContext::Http {
                method,
                uri,
                headers,
            } => NormalizedCall {
                transport: Transport::Http,
                method: method.as_str().to_string(),
                path: strip_context_path(uri.path(), context_path).to_string(),
                query: parse_query(uri.query()),
                headers: flatten_headers(headers),
                authorization: authorization_value(headers),
            },
            CallContext::Rpc { uri, metadata } => NormalizedCall {
                transport: Transport::Grpc,
                method: Method::POST.as_str().to_string(),
                path: uri.path().to_string(),
                query: BTreeMap::new(),
                headers: flatten_headers(metadata),
                authorization: authorization_value(metadata),
            },
        }
    }
}

/// Owned, transport-neutral call description.
#[derive(Clone, PartialEq)]
pub struct NormalizedCall {
    pub transport: Transport,
    pub method: String,
    /// Path with the context path removed.
    pub path: String,
    pub query: BTreeMap<String, Vec<String>>,
    /// Lowercase header names; repeated values joined with `", "`.
    pub headers: BTreeMap<String, String>,
    /// Raw `authorization` header value.
    pub authorization: Option<String>,
}

impl NormalizedCall {
    /// Token of an `Authorization: Bearer <token>` header.
    ///
    /// The scheme is matched exactly and an empty token counts as absent.
    pub fn bearer_token(&self) -> Option<&str> {
        self.authorization
            .as_deref()
            .and_then(|value| value.strip_prefix("Bearer "))
            .filter(|token| !token.is_empty())
    }
}

impl fmt::Debug for NormalizedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizedCall")
            .field("transport", &self.transport)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("header_count", &self.headers.len())
            .field(
                "authorization",
                &self.authorization.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Remove `context_path` from the front of `path`.
///
/// Trailing slashes of the context path are ignored and only whole segments
/// are stripped, so `/testing` keeps its prefix under `/test`.
pub fn strip_context_path<'p>(path: &'p str, context_path: &str) -> &'p str {
    let prefix = context_path.trim_end_matches('/');
    if prefix.is_empty() {
        return path;
    }

    match path.strip_prefix(prefix) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    }
}

/// Flatten a header map to `name -> value`.
///
/// Repeated headers are joined with `", "`; values that are not UTF-8 are dropped.
pub fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = std::str::from_utf8(value.as_bytes()) else {
            continue;
        };
        flat.entry(name.as_str().to_string())
            .and_modify(|joined| {
                joined.push_str(", ");
                joined.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    flat
}

fn authorization_value(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| std::str::from_utf8(value.as_bytes()).ok())
        .map(str::to_string)
}
