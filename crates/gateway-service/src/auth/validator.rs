//! Token validator.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only the configured HMAC algorithm is accepted
//! - `exp` and `nbf` are enforced with zero leeway; `iat` with clock skew
//! - The token store must confirm exactly one record for the token
//! - Tokens and subject ids are never logged

use crate::auth::{AuthError, Claims, InvalidReason, RevokedReason};
use crate::config::Config;
use crate::models::Identity;
use crate::observability::metrics::record_store_lookup;
use crate::repositories::{StoreError, TokenStore};
use common::jwt::{inspect_header_alg, validate_iat, JwtValidationError, SigningAlgorithm};
use common::secret::ExposeSecret;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, DecodingKey, Validation};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Validates presented tokens against the signing secret and token store.
///
/// Holds only immutable configuration and a shared store handle, so a single
/// instance serves every request concurrently.
pub struct TokenValidator {
    decoding_key: DecodingKey,
    algorithm: SigningAlgorithm,
    validation: Validation,
    clock_skew: Duration,
    subject_claim: String,
    store: Arc<dyn TokenStore>,
    store_timeout: Duration,
}

impl TokenValidator {
    /// Create a validator from gateway configuration.
    pub fn new(config: &Config, store: Arc<dyn TokenStore>) -> Self {
        let algorithm = config.jwt_algorithm;
        let clock_skew =
            Duration::from_secs(u64::try_from(config.jwt_clock_skew_seconds).unwrap_or(0));

        let mut validation = Validation::new(algorithm.to_jsonwebtoken());
        // exp is optional; revocation is the store's job
        validation.required_spec_claims.clear();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.leeway = 0;

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.expose_secret().as_bytes()),
            algorithm,
            validation,
            clock_skew,
            subject_claim: config.subject_claim.clone(),
            store,
            store_timeout: config.store_timeout,
        }
    }

    /// Validate a token and return the identity it proves.
    ///
    /// # Checks
    ///
    /// 1. Empty token - `Missing`
    /// 2. Size and header `alg` - must equal the configured algorithm
    /// 3. Signature, `exp`, `nbf`
    /// 4. `iat` no further in the future than the clock skew
    /// 5. Subject claim present
    /// 6. Exactly one store record matching `(subject, token)`
    ///
    /// The store is only read. Validating the same token twice yields the
    /// same result as long as the store has not changed in between.
    ///
    /// # Errors
    ///
    /// - `AuthError::Missing` for an empty token
    /// - `AuthError::Invalid` for any local check failure
    /// - `AuthError::Revoked` for store misses, duplicates, errors and timeouts
    /// - `AuthError::Internal` when the signature backend fails unexpectedly
    #[instrument(skip_all, name = "gw.auth.validate")]
    pub async fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::Missing);
        }

        let claims = self.verify_locally(token)?;

        let subject_id = claims.subject(&self.subject_claim).ok_or_else(|| {
            tracing::debug!(
                target: "gw.auth.validator",
                claim = %self.subject_claim,
                "Token has no usable subject claim"
            );
            AuthError::Invalid(InvalidReason::MissingSubject)
        })?;

        self.confirm_with_store(&subject_id, token).await?;

        tracing::debug!(target: "gw.auth.validator", "Token validated successfully");
        Ok(Identity::new(subject_id))
    }

    /// Signature and time-claim checks. No I/O.
    fn verify_locally(&self, token: &str) -> Result<Claims, AuthError> {
        let alg = inspect_header_alg(token).map_err(|e| {
            tracing::debug!(target: "gw.auth.validator", error = ?e, "Token header rejected");
            AuthError::Invalid(match e {
                JwtValidationError::TokenTooLarge => InvalidReason::TooLarge,
                _ => InvalidReason::Malformed,
            })
        })?;

        if alg != self.algorithm.as_str() {
            tracing::debug!(
                target: "gw.auth.validator",
                alg = %alg,
                expected = %self.algorithm,
                "Token signed with unexpected algorithm"
            );
            return Err(AuthError::Invalid(InvalidReason::AlgorithmMismatch));
        }

        let token_data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                tracing::debug!(target: "gw.auth.validator", error = %e, "Token verification failed");
                map_jwt_error(e.kind())
            })?;
        let claims = token_data.claims;

        if claims.has_issued_at() {
            let iat = claims
                .issued_at()
                .ok_or(AuthError::Invalid(InvalidReason::Malformed))?;
            validate_iat(iat, self.clock_skew).map_err(|e| {
                tracing::debug!(target: "gw.auth.validator", error = ?e, "Token iat validation failed");
                AuthError::Invalid(InvalidReason::IatInFuture)
            })?;
        }

        Ok(claims)
    }

    async fn confirm_with_store(&self, subject_id: &str, token: &str) -> Result<(), AuthError> {
        let backend = self.store.backend();
        let start = Instant::now();

        let lookup = tokio::time::timeout(
            self.store_timeout,
            self.store.find_matching(subject_id, token),
        )
        .await
        .unwrap_or(Err(StoreError::Timeout));

        let records = match lookup {
            Ok(records) => {
                record_store_lookup(backend, "success", start.elapsed());
                records
            }
            Err(e) => {
                record_store_lookup(backend, e.label(), start.elapsed());
                tracing::warn!(
                    target: "gw.auth.validator",
                    backend = backend,
                    error = %e,
                    "Token store lookup failed, denying request"
                );
                return Err(AuthError::Revoked(e.into()));
            }
        };

        match records.as_slice() {
            [] => {
                tracing::debug!(target: "gw.auth.validator", "No token record matched");
                Err(AuthError::Revoked(RevokedReason::NoMatch))
            }
            [record] => {
                if record.subject_id == subject_id && record.token.expose_secret() == token {
                    Ok(())
                } else {
                    tracing::warn!(
                        target: "gw.auth.validator",
                        backend = backend,
                        "Token store returned a record that does not match the lookup"
                    );
                    Err(AuthError::Revoked(RevokedReason::NoMatch))
                }
            }
            many => {
                tracing::warn!(
                    target: "gw.auth.validator",
                    backend = backend,
                    matches = many.len(),
                    "Token store holds duplicate records for one token"
                );
                Err(AuthError::Revoked(RevokedReason::Ambiguous(many.len())))
            }
        }
    }
}

fn map_jwt_error(kind: &JwtErrorKind) -> AuthError {
    match kind {
        JwtErrorKind::ExpiredSignature => AuthError::Invalid(InvalidReason::Expired),
        JwtErrorKind::ImmatureSignature => AuthError::Invalid(InvalidReason::NotYetValid),
        JwtErrorKind::InvalidSignature => AuthError::Invalid(InvalidReason::BadSignature),
        JwtErrorKind::InvalidAlgorithm => AuthError::Invalid(InvalidReason::AlgorithmMismatch),
        JwtErrorKind::InvalidKeyFormat
        | JwtErrorKind::InvalidEcdsaKey
        | JwtErrorKind::InvalidRsaKey(_)
        | JwtErrorKind::RsaFailedSigning
        | JwtErrorKind::Crypto(_) => AuthError::Internal(format!("signature backend: {kind:?}")),
        _ => AuthError::Invalid(InvalidReason::Malformed),
    }
}
