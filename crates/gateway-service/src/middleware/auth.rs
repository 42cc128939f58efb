//! Authentication gate.
//!
//! Every request passes through here before it can reach the proxy.
//! Extracts the token from the Authorization header, validates it, and
//! injects the resulting [`Identity`] into request extensions.

use crate::auth::{AuthError, TokenValidator};
use crate::errors::GatewayError;
use crate::models::Identity;
use crate::observability::metrics::record_auth_decision;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use common::secret::{ExposeSecret, SecretString};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub validator: Arc<TokenValidator>,
}

/// Authentication middleware.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: <scheme> <token>
/// ```
///
/// The scheme word is not checked; the token is the second space-separated
/// segment.
///
/// # Response
///
/// - 401 if the header is missing or carries no token
/// - 403 if validation fails for any reason, including a validator panic
/// - Otherwise continues with the identity in request extensions
#[instrument(skip(state, req, next), name = "gw.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let Some(token) = extract_token(req.headers()) else {
        tracing::debug!(target: "gw.middleware.auth", "No token provided");
        return Err(deny(AuthError::Missing));
    };

    // Fail closed if validation panics
    let outcome = AssertUnwindSafe(state.validator.validate(token.expose_secret()))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(AuthError::Internal("token validation panicked".to_string())));

    match outcome {
        Ok(identity) => {
            record_auth_decision("allowed", "none");
            req.extensions_mut().insert(identity);
            Ok(next.run(req).await)
        }
        Err(err) => Err(deny(err)),
    }
}

fn deny(err: AuthError) -> GatewayError {
    record_auth_decision("denied", err.kind().as_str());
    tracing::info!(
        target: "gw.middleware.auth",
        kind = err.kind().as_str(),
        reason = err.reason(),
        "Request denied"
    );
    GatewayError::Auth(err)
}

/// Token from `Authorization: <scheme> <token>`.
///
/// Returns `None` when the header is absent, not valid UTF-8, or has no
/// non-empty second segment.
pub fn extract_token(headers: &HeaderMap) -> Option<SecretString> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    value
        .split(' ')
        .nth(1)
        .filter(|token| !token.is_empty())
        .map(SecretString::from)
}

/// Extension trait for reading the identity in handlers.
pub trait IdentityExt {
    /// Returns `None` if the auth middleware was not applied to this request.
    fn identity(&self) -> Option<&Identity>;
}

impl<B> IdentityExt for axum::http::Request<B> {
    fn identity(&self) -> Option<&Identity> {
        self.extensions().get::<Identity>()
    }
}
