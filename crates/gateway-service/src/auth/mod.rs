//! Token validation for the auth gateway.
//!
//! A token is accepted only when its signature and time claims check out
//! locally AND the token store holds exactly one record for its
//! `(subject_id, token)` pair.

pub mod claims;
pub mod validator;

pub use claims::Claims;
pub use validator::TokenValidator;

use crate::errors::ErrorKind;
use crate::repositories::StoreError;
use thiserror::Error;

/// Why a token failed the local checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    TooLarge,
    Malformed,
    AlgorithmMismatch,
    BadSignature,
    Expired,
    NotYetValid,
    IatInFuture,
    MissingSubject,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::TooLarge => "too_large",
            InvalidReason::Malformed => "malformed",
            InvalidReason::AlgorithmMismatch => "algorithm_mismatch",
            InvalidReason::BadSignature => "bad_signature",
            InvalidReason::Expired => "expired",
            InvalidReason::NotYetValid => "not_yet_valid",
            InvalidReason::IatInFuture => "iat_in_future",
            InvalidReason::MissingSubject => "missing_subject",
        }
    }
}

/// Why a locally-valid token was not confirmed by the token store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokedReason {
    /// No record for the pair.
    NoMatch,
    /// More than one record for the pair.
    Ambiguous(usize),
    /// Store could not be queried.
    StoreUnavailable(String),
    /// Store did not answer within the lookup timeout.
    StoreTimeout,
}

impl RevokedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevokedReason::NoMatch => "no_match",
            RevokedReason::Ambiguous(_) => "ambiguous",
            RevokedReason::StoreUnavailable(_) => "store_unavailable",
            RevokedReason::StoreTimeout => "store_timeout",
        }
    }
}

impl From<StoreError> for RevokedReason {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout => RevokedReason::StoreTimeout,
            StoreError::Unavailable(detail) | StoreError::InvalidResponse(detail) => {
                RevokedReason::StoreUnavailable(detail)
            }
        }
    }
}

/// Token validation failure.
///
/// Display strings are for server-side logs only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no token provided")]
    Missing,

    #[error("token rejected: {}", .0.as_str())]
    Invalid(InvalidReason),

    #[error("token not recognized by store: {}", .0.as_str())]
    Revoked(RevokedReason),

    #[error("unexpected authentication failure: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Missing => ErrorKind::MissingCredential,
            AuthError::Invalid(
                InvalidReason::TooLarge
                | InvalidReason::Malformed
                | InvalidReason::AlgorithmMismatch
                | InvalidReason::MissingSubject,
            ) => ErrorKind::MalformedToken,
            AuthError::Invalid(
                InvalidReason::BadSignature
                | InvalidReason::Expired
                | InvalidReason::NotYetValid
                | InvalidReason::IatInFuture,
            ) => ErrorKind::ExpiredOrInvalidSignature,
            AuthError::Revoked(_) => ErrorKind::NotRecognizedByStore,
            AuthError::Internal(_) => ErrorKind::InternalUnexpected,
        }
    }

    /// Fine-grained reason label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Missing => "missing",
            AuthError::Invalid(reason) => reason.as_str(),
            AuthError::Revoked(reason) => reason.as_str(),
            AuthError::Internal(_) => "internal",
        }
    }
}
