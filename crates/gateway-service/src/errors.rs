//! Auth gateway error types.
//!
//! Every failure a request can hit maps to an HTTP status via the
//! `IntoResponse` impl. Client bodies are fixed `{"message": ...}` strings;
//! the actual reason is logged server-side and exposed to metrics through
//! [`ErrorKind`].

use crate::auth::{AuthError, InvalidReason};
use crate::models::MessageResponse;
use crate::proxy::ProxyError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Body for a missing or unparseable credential.
pub const MSG_NO_TOKEN: &str = "Access Denied. No token provided.";

/// Body for tokens that are expired or unknown to the token store.
pub const MSG_INVALID_OR_EXPIRED: &str = "Invalid or expired token.";

/// Body for tokens that fail structural or signature checks.
pub const MSG_INVALID_TOKEN: &str = "Invalid Token";

pub const MSG_BAD_GATEWAY: &str = "Bad Gateway";
pub const MSG_GATEWAY_TIMEOUT: &str = "Gateway Timeout";
pub const MSG_BODY_TOO_LARGE: &str = "Request body too large";
pub const MSG_BAD_REQUEST_BODY: &str = "Invalid request body";

/// Coarse failure classification used for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingCredential,
    MalformedToken,
    ExpiredOrInvalidSignature,
    NotRecognizedByStore,
    UpstreamUnavailable,
    UpstreamTimeout,
    InternalUnexpected,
    RequestTooLarge,
    RequestBodyUnreadable,
}

impl ErrorKind {
    /// Stable label value for metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MissingCredential => "missing_credential",
            ErrorKind::MalformedToken => "malformed_token",
            ErrorKind::ExpiredOrInvalidSignature => "expired_or_invalid_signature",
            ErrorKind::NotRecognizedByStore => "not_recognized_by_store",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::UpstreamTimeout => "upstream_timeout",
            ErrorKind::InternalUnexpected => "internal_unexpected",
            ErrorKind::RequestTooLarge => "request_too_large",
            ErrorKind::RequestBodyUnreadable => "request_body_unreadable",
        }
    }
}

/// Top-level gateway error.
///
/// Maps to HTTP status codes:
/// - Auth(Missing): 401 Unauthorized
/// - Auth(anything else): 403 Forbidden
/// - Proxy(Unavailable): 502 Bad Gateway
/// - Proxy(Timeout): 504 Gateway Timeout
/// - Proxy(PayloadTooLarge): 413 Payload Too Large
/// - Proxy(RequestBody): 400 Bad Request
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

impl GatewayError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Auth(AuthError::Missing) => StatusCode::UNAUTHORIZED,
            GatewayError::Auth(_) => StatusCode::FORBIDDEN,
            GatewayError::Proxy(ProxyError::Unavailable(_)) => StatusCode::BAD_GATEWAY,
            GatewayError::Proxy(ProxyError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Proxy(ProxyError::PayloadTooLarge) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Proxy(ProxyError::RequestBody(_)) => StatusCode::BAD_REQUEST,
        }
    }

    /// Classify this error for observability.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Auth(err) => err.kind(),
            GatewayError::Proxy(ProxyError::Unavailable(_)) => ErrorKind::UpstreamUnavailable,
            GatewayError::Proxy(ProxyError::Timeout) => ErrorKind::UpstreamTimeout,
            GatewayError::Proxy(ProxyError::PayloadTooLarge) => ErrorKind::RequestTooLarge,
            GatewayError::Proxy(ProxyError::RequestBody(_)) => ErrorKind::RequestBodyUnreadable,
        }
    }

    /// Client-facing message. Never carries the internal reason.
    pub fn client_message(&self) -> &'static str {
        match self {
            GatewayError::Auth(AuthError::Missing) => MSG_NO_TOKEN,
            GatewayError::Auth(AuthError::Invalid(
                InvalidReason::Expired | InvalidReason::NotYetValid | InvalidReason::MissingSubject,
            ))
            | GatewayError::Auth(AuthError::Revoked(_)) => MSG_INVALID_OR_EXPIRED,
            GatewayError::Auth(AuthError::Invalid(_) | AuthError::Internal(_)) => {
                MSG_INVALID_TOKEN
            }
            GatewayError::Proxy(ProxyError::Unavailable(_)) => MSG_BAD_GATEWAY,
            GatewayError::Proxy(ProxyError::Timeout) => MSG_GATEWAY_TIMEOUT,
            GatewayError::Proxy(ProxyError::PayloadTooLarge) => MSG_BODY_TOO_LARGE,
            GatewayError::Proxy(ProxyError::RequestBody(_)) => MSG_BAD_REQUEST_BODY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.kind();

        match &self {
            GatewayError::Auth(AuthError::Internal(detail)) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(
                    target: "gw.errors",
                    error = %detail,
                    kind = kind.as_str(),
                    "Unexpected failure during authentication"
                );
            }
            GatewayError::Auth(err) => {
                tracing::debug!(
                    target: "gw.errors",
                    reason = %err,
                    kind = kind.as_str(),
                    status = status.as_u16(),
                    "Request rejected"
                );
            }
            GatewayError::Proxy(err @ ProxyError::RequestBody(_)) => {
                tracing::debug!(
                    target: "gw.errors",
                    error = %err,
                    kind = kind.as_str(),
                    status = status.as_u16(),
                    "Request body read failed"
                );
            }
            GatewayError::Proxy(err) => {
                tracing::warn!(
                    target: "gw.errors",
                    error = %err,
                    kind = kind.as_str(),
                    status = status.as_u16(),
                    "Upstream forwarding failed"
                );
            }
        }

        (status, Json(MessageResponse::new(self.client_message()))).into_response()
    }
}
