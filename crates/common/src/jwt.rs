//! JWT utilities shared across the gateway crates.
//!
//! This module provides the structural checks that run before any
//! cryptographic verification:
//! - Size limits for DoS prevention
//! - Clock skew constants for iat validation
//! - Header inspection (`alg` extraction) without signature verification
//! - iat validation logic
//! - The set of HMAC algorithms the gateway accepts
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only the single configured HMAC algorithm is accepted
//! - Error messages are generic to prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{inspect_header_alg, validate_iat, SigningAlgorithm, DEFAULT_CLOCK_SKEW};
//!
//! let alg = inspect_header_alg(token)?;
//! if alg != SigningAlgorithm::Hs256.as_str() {
//!     return Err("unexpected algorithm");
//! }
//!
//! // After signature verification
//! validate_iat(claims.iat, DEFAULT_CLOCK_SKEW)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this are rejected BEFORE any base64 decoding or HMAC
/// computation. Typical HS256 tokens issued for this gateway are well under
/// 500 bytes.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (5 minutes per NIST SP 800-63B).
///
/// Tokens with `iat` (issued-at) timestamps more than this amount in the
/// future are rejected.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors from the structural JWT checks.
///
/// Display strings are intentionally identical. Callers log the variant at
/// debug level and never surface it to clients.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token header does not carry a string `alg`.
    #[error("The access token is invalid or expired")]
    MissingAlgorithm,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Algorithms
// =============================================================================

/// HMAC algorithms accepted for gateway tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256 (default, matches the token issuer).
    #[default]
    Hs256,
    /// HMAC with SHA-384.
    Hs384,
    /// HMAC with SHA-512.
    Hs512,
}

impl SigningAlgorithm {
    /// JOSE name of the algorithm as it appears in the JWT header.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hs256 => "HS256",
            Self::Hs384 => "HS384",
            Self::Hs512 => "HS512",
        }
    }

    /// The matching `jsonwebtoken` algorithm.
    #[must_use]
    pub const fn to_jsonwebtoken(self) -> jsonwebtoken::Algorithm {
        match self {
            Self::Hs256 => jsonwebtoken::Algorithm::HS256,
            Self::Hs384 => jsonwebtoken::Algorithm::HS384,
            Self::Hs512 => jsonwebtoken::Algorithm::HS512,
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unsupported algorithm name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported signing algorithm '{0}' (expected HS256, HS384 or HS512)")]
pub struct UnsupportedAlgorithm(pub String);

impl FromStr for SigningAlgorithm {
    type Err = UnsupportedAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HS256" => Ok(Self::Hs256),
            "HS384" => Ok(Self::Hs384),
            "HS512" => Ok(Self::Hs512),
            _ => Err(UnsupportedAlgorithm(s.to_string())),
        }
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Extract the `alg` from a JWT header without verifying the signature.
///
/// Used to reject tokens whose structure or algorithm is wrong before the
/// signature is checked, so that those failures are classified as malformed
/// rather than mis-signed.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing (denial-of-service prevention)
/// - This function does NOT validate the token signature
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Wrong number of segments, bad base64, invalid JSON
/// - `MissingAlgorithm` - Header has no string `alg`
pub fn inspect_header_alg(token: &str) -> Result<String, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let mut parts = token.split('.');
    let (Some(header_part), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    header
        .get("alg")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingAlgorithm)
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// Rejects tokens with `iat` more than `clock_skew` in the future.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the iat timestamp is
/// more than `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds)
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_possible_wrap)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Constants Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_max_jwt_size_is_8kb() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
    }

    #[test]
    fn test_default_clock_skew_is_5_minutes() {
        assert_eq!(DEFAULT_CLOCK_SKEW, Duration::from_secs(300));
    }

    #[test]
    fn test_max_clock_skew_is_10_minutes() {
        assert_eq!(MAX_CLOCK_SKEW, Duration::from_secs(600));
    }

    // -------------------------------------------------------------------------
    // SigningAlgorithm Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_signing_algorithm_parse_is_case_insensitive() {
        assert_eq!("HS256".parse::<SigningAlgorithm>(), Ok(SigningAlgorithm::Hs256));
        assert_eq!("hs384".parse::<SigningAlgorithm>(), Ok(SigningAlgorithm::Hs384));
        assert_eq!(" Hs512 ".parse::<SigningAlgorithm>(), Ok(SigningAlgorithm::Hs512));
    }

    #[test]
    fn test_signing_algorithm_rejects_asymmetric_and_none() {
        for name in ["RS256", "EdDSA", "none", ""] {
            assert!(
                name.parse::<SigningAlgorithm>().is_err(),
                "{name} should not be accepted"
            );
        }
    }

    #[test]
    fn test_signing_algorithm_default_is_hs256() {
        assert_eq!(SigningAlgorithm::default(), SigningAlgorithm::Hs256);
        assert_eq!(SigningAlgorithm::default().to_string(), "HS256");
        assert_eq!(
            SigningAlgorithm::default().to_jsonwebtoken(),
            jsonwebtoken::Algorithm::HS256
        );
    }

    // -------------------------------------------------------------------------
    // inspect_header_alg Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_inspect_header_alg_valid_token() {
        let header = r#"{"alg":"HS256","typ":"JWT"}"#;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        let token = format!("{header_b64}.payload.signature");

        assert_eq!(inspect_header_alg(&token).unwrap(), "HS256");
    }

    #[test]
    fn test_inspect_header_alg_missing_alg() {
        let header_b64 = URL_SAFE_NO_PAD.encode(r#"{"typ":"JWT"}"#);
        let token = format!("{header_b64}.payload.signature");

        let result = inspect_header_alg(&token);
        assert!(matches!(result, Err(JwtValidationError::MissingAlgorithm)));
    }

    #[test]
    fn test_inspect_header_alg_non_string_alg() {
        let header_b64 = URL_SAFE_NO_PAD.encode(r#"{"alg":256,"typ":"JWT"}"#);
        let token = format!("{header_b64}.payload.signature");

        let result = inspect_header_alg(&token);
        assert!(matches!(result, Err(JwtValidationError::MissingAlgorithm)));
    }

    #[test]
    fn test_inspect_header_alg_wrong_segment_count() {
        for token in ["not-a-jwt", "only.two", "a.b.c.d", ""] {
            let result = inspect_header_alg(token);
            assert!(
                matches!(result, Err(JwtValidationError::MalformedToken)),
                "{token:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_inspect_header_alg_invalid_base64() {
        let result = inspect_header_alg("!!!invalid!!!.payload.signature");
        assert!(matches!(result, Err(JwtValidationError::MalformedToken)));
    }

    #[test]
    fn test_inspect_header_alg_invalid_json() {
        let header_b64 = URL_SAFE_NO_PAD.encode("not-json");
        let token = format!("{header_b64}.payload.signature");

        let result = inspect_header_alg(&token);
        assert!(matches!(result, Err(JwtValidationError::MalformedToken)));
    }

    #[test]
    fn test_inspect_header_alg_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        let result = inspect_header_alg(&oversized);
        assert!(matches!(result, Err(JwtValidationError::TokenTooLarge)));
    }

    #[test]
    fn test_inspect_header_alg_at_size_limit() {
        let header_b64 = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let remaining = MAX_JWT_SIZE_BYTES - header_b64.len() - 2; // -2 for two dots
        let payload_len = remaining / 2;
        let sig_len = remaining - payload_len;
        let token = format!(
            "{}.{}.{}",
            header_b64,
            "a".repeat(payload_len),
            "b".repeat(sig_len)
        );

        assert_eq!(token.len(), MAX_JWT_SIZE_BYTES);
        assert_eq!(inspect_header_alg(&token).unwrap(), "HS256");
    }

    // -------------------------------------------------------------------------
    // validate_iat Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_iat_current_time() {
        let now = chrono::Utc::now().timestamp();
        assert!(validate_iat(now, DEFAULT_CLOCK_SKEW).is_ok());
    }

    #[test]
    fn test_validate_iat_past_time() {
        let past = chrono::Utc::now().timestamp() - 3600;
        assert!(validate_iat(past, DEFAULT_CLOCK_SKEW).is_ok());
    }

    #[test]
    fn test_validate_iat_far_future() {
        let far_future = chrono::Utc::now().timestamp() + 86400;
        let result = validate_iat(far_future, DEFAULT_CLOCK_SKEW);
        assert!(matches!(result, Err(JwtValidationError::IatTooFarInFuture)));
    }

    #[test]
    fn test_validate_iat_at_boundary_exact() {
        let now = 1_700_000_000_i64;

        // iat == now + skew is the last accepted value
        assert!(validate_iat_at(now + 300, DEFAULT_CLOCK_SKEW, now).is_ok());

        assert!(matches!(
            validate_iat_at(now + 301, DEFAULT_CLOCK_SKEW, now),
            Err(JwtValidationError::IatTooFarInFuture)
        ));
    }
}
