//! Builder patterns for test data construction
//!
//! Provides a fluent API for token claims. Defaults match the issuer and
//! audience [`crate::TestApiServer`] is configured with.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Issuer the test server expects.
pub const TEST_ISSUER: &str = "https://example-authority/";

/// Audience the test server expects.
pub const TEST_AUDIENCE: &str = "api-audience";

/// Builder for creating test JWT claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .for_user("auth0|alice")
///     .with_email("alice@example.com")
///     .expires_in(3600)
///     .build();
/// ```
pub struct TestTokenBuilder {
    iss: Option<String>,
    sub: String,
    aud: Value,
    exp: Option<i64>,
    iat: i64,
    nbf: Option<i64>,
    email: Option<String>,
    name: Option<String>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults valid for one hour.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            iss: Some(TEST_ISSUER.to_string()),
            sub: "auth0|test-subject".to_string(),
            aud: json!([TEST_AUDIENCE]),
            exp: Some((now + Duration::seconds(3600)).timestamp()),
            iat: now.timestamp(),
            nbf: None,
            email: Some("a@b.com".to_string()),
            name: Some("Test User".to_string()),
        }
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the issuer
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.iss = Some(issuer.to_string());
        self
    }

    /// Omit the issuer
    pub fn without_issuer(mut self) -> Self {
        self.iss = None;
        self
    }

    /// Set a single-element audience array
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.aud = json!([audience]);
        self
    }

    /// Set the audience as a bare string, as some authorities issue it
    pub fn with_audience_string(mut self, audience: &str) -> Self {
        self.aud = json!(audience);
        self
    }

    /// Set a multi-element audience array
    pub fn with_audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = json!(audiences);
        self
    }

    /// Set expiration in seconds from now (negative for the past)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Set an absolute expiration timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = Some(timestamp);
        self
    }

    /// Omit the expiration
    pub fn without_expiry(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Set not-before timestamp
    pub fn not_before(mut self, timestamp: i64) -> Self {
        self.nbf = Some(timestamp);
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = Map::new();
        if let Some(iss) = self.iss {
            claims.insert("iss".to_string(), json!(iss));
        }
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("aud".to_string(), self.aud);
        if let Some(exp) = self.exp {
            claims.insert("exp".to_string(), json!(exp));
        }
        claims.insert("iat".to_string(), json!(self.iat));
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), json!(nbf));
        }
        if let Some(email) = self.email {
            claims.insert("email".to_string(), json!(email));
        }
        if let Some(name) = self.name {
            claims.insert("name".to_string(), json!(name));
        }
        Value::Object(claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
