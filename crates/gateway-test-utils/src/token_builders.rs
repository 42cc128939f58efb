//! Builder patterns for test token construction
//!
//! Provides a fluent API for creating signed HMAC tokens.

use crate::TEST_JWT_SECRET;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Builder for creating signed test tokens
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_subject("u1")
///     .expires_in(3600)
///     .build();
/// ```
pub struct TestTokenBuilder {
    subject_claim: String,
    subject: Option<Value>,
    iat: Option<i64>,
    exp: Option<i64>,
    nbf: Option<i64>,
    extra: Map<String, Value>,
    secret: String,
    algorithm: Algorithm,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    ///
    /// Subject `test-subject` under `id`, issued now, expiring in an hour,
    /// signed with `TEST_JWT_SECRET` using HS256.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            subject_claim: "id".to_string(),
            subject: Some(json!("test-subject")),
            iat: Some(now.timestamp()),
            exp: Some((now + Duration::seconds(3600)).timestamp()),
            nbf: None,
            extra: Map::new(),
            secret: TEST_JWT_SECRET.to_string(),
            algorithm: Algorithm::HS256,
        }
    }

    /// Set the subject id (string)
    pub fn for_subject(mut self, subject: &str) -> Self {
        self.subject = Some(json!(subject));
        self
    }

    /// Set the subject id as a JSON integer
    pub fn for_numeric_subject(mut self, subject: i64) -> Self {
        self.subject = Some(json!(subject));
        self
    }

    /// Put the subject under a different claim name
    pub fn subject_claim(mut self, claim: &str) -> Self {
        self.subject_claim = claim.to_string();
        self
    }

    /// Omit the subject claim entirely
    pub fn without_subject(mut self) -> Self {
        self.subject = None;
        self
    }

    /// Set expiration in seconds from now (negative for expired)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Token that expired a minute ago
    pub fn expired(self) -> Self {
        self.expires_in(-60)
    }

    /// Omit `exp`
    pub fn without_expiry(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = Some(timestamp);
        self
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.nbf = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Add an arbitrary claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Sign with a different secret
    pub fn signed_with(mut self, secret: &str) -> Self {
        self.secret = secret.to_string();
        self
    }

    /// Sign with a different HMAC algorithm
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Build the claims as a JSON value
    pub fn claims(&self) -> Value {
        let mut claims = self.extra.clone();
        if let Some(subject) = &self.subject {
            claims.insert(self.subject_claim.clone(), subject.clone());
        }
        if let Some(iat) = self.iat {
            claims.insert("iat".to_string(), json!(iat));
        }
        if let Some(exp) = self.exp {
            claims.insert("exp".to_string(), json!(exp));
        }
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), json!(nbf));
        }
        Value::Object(claims)
    }

    /// Sign and encode the token
    pub fn build(self) -> String {
        encode(
            &Header::new(self.algorithm),
            &self.claims(),
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .expect("HMAC signing should not fail")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
