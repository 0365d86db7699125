//! Builder patterns for test claim construction

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Builder for creating test JWT claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestClaimsBuilder::new()
///     .subject("alice")
///     .issuer("https://issuer.example.com")
///     .claim("roles", json!(["admin"]))
///     .build();
/// ```
pub struct TestClaimsBuilder {
    sub: String,
    iss: Option<String>,
    exp: Option<i64>,
    nbf: Option<i64>,
    iat: i64,
    extra: Map<String, Value>,
}

impl TestClaimsBuilder {
    /// Create a new builder: subject `test-subject`, valid for one hour.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-subject".to_string(),
            iss: None,
            exp: Some((now + Duration::seconds(3600)).timestamp()),
            nbf: None,
            iat: now.timestamp(),
            extra: Map::new(),
        }
    }

    /// Set the subject
    pub fn subject(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the issuer
    pub fn issuer(mut self, issuer: &str) -> Self {
        self.iss = Some(issuer.to_string());
        self
    }

    /// Set expiration in seconds from now (negative for an expired token)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Drop the `exp` claim entirely
    pub fn without_expiry(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.nbf = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Add an arbitrary claim
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = self.extra;
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("iat".to_string(), json!(self.iat));
        if let Some(iss) = self.iss {
            claims.insert("iss".to_string(), json!(iss));
        }
        if let Some(exp) = self.exp {
            claims.insert("exp".to_string(), json!(exp));
        }
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), json!(nbf));
        }
        Value::Object(claims)
    }
}

impl Default for TestClaimsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
