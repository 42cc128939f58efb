//! Decoded token claims.
//!
//! The issuer's payload shape is not fixed, so claims are kept as a JSON
//! object and read through accessors. Debug output never prints claim values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Claims carried by a verified token.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(serde_json::Map<String, serde_json::Value>);

impl Claims {
    /// Subject id read from `claim`.
    ///
    /// Non-empty strings are returned as-is and integers in decimal. Any
    /// other type, or an empty string, counts as absent.
    pub fn subject(&self, claim: &str) -> Option<String> {
        match self.0.get(claim)? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
            _ => None,
        }
    }

    /// `iat` as Unix seconds, if present and numeric.
    pub fn issued_at(&self) -> Option<i64> {
        numeric(self.0.get("iat")?)
    }

    /// Whether an `iat` claim exists at all, numeric or not.
    pub fn has_issued_at(&self) -> bool {
        self.0.contains_key("iat")
    }
}

#[allow(clippy::cast_possible_truncation)]
fn numeric(value: &serde_json::Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
}

/// Lists claim names only; values may identify the caller.
impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("names", &self.0.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: serde_json::Value) -> Claims {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_subject_from_string() {
        let c = claims(json!({"id": "u1"}));
        assert_eq!(c.subject("id").as_deref(), Some("u1"));
    }

    #[test]
    fn test_subject_from_integer() {
        let c = claims(json!({"id": 1234}));
        assert_eq!(c.subject("id").as_deref(), Some("1234"));
    }

    #[test]
    fn test_subject_absent_for_other_types() {
        for value in [
            json!(""),
            json!(null),
            json!(true),
            json!(1.5),
            json!([1]),
            json!({"nested": "u1"}),
        ] {
            let c = claims(json!({ "id": value }));
            assert!(c.subject("id").is_none(), "{value} should not be a subject");
        }
    }

    #[test]
    fn test_subject_uses_configured_claim() {
        let c = claims(json!({"id": "u1", "sub": "other"}));
        assert_eq!(c.subject("sub").as_deref(), Some("other"));
        assert!(c.subject("user_id").is_none());
    }

    #[test]
    fn test_time_claims() {
        let c = claims(json!({"iat": 1_700_000_000.9, "exp": 1_700_003_600}));
        assert_eq!(c.issued_at(), Some(1_700_000_000));
        assert!(c.has_issued_at());

        let c = claims(json!({"iat": "yesterday"}));
        assert!(c.issued_at().is_none());
        assert!(c.has_issued_at());
    }

    #[test]
    fn test_debug_hides_values() {
        let c = claims(json!({"id": "secret-user", "email": "a@example.com"}));
        let debug_str = format!("{:?}", c);

        assert!(debug_str.contains("id"));
        assert!(!debug_str.contains("secret-user"));
        assert!(!debug_str.contains("a@example.com"));
    }
}
