//! Catch-all handler that forwards authorized requests upstream.

use crate::errors::GatewayError;
use crate::middleware::auth::IdentityExt;
use crate::models::RequestContext;
use crate::proxy::ProxyError;
use crate::routes::AppState;
use axum::{
    extract::{Request, State},
    http::header::CONTENT_LENGTH,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use std::error::Error as _;
use std::sync::Arc;
use tracing::instrument;

/// Forward the request to the upstream API and relay its response.
///
/// Only reachable through the auth middleware, so the identity is always
/// present here. The body is buffered up to the configured limit.
#[instrument(skip_all, name = "gw.handlers.forward_request")]
pub async fn forward_request(
    State(state): State<Arc<AppState>>,
    req: Request,
) -> Result<Response, GatewayError> {
    let limit = state.config.max_request_body_bytes;
    let identity = req.identity().cloned();

    let declared_length = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared_length.is_some_and(|len| len > limit as u64) {
        return Err(ProxyError::PayloadTooLarge.into());
    }

    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, limit)
        .await
        .map_err(classify_body_error)?;

    let ctx = RequestContext {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(ToString::to_string),
        headers: parts.headers,
        body,
        identity,
    };

    let response = state.proxy.forward(ctx).await?;
    Ok(response.into_response())
}

/// Only the buffering limit is a 413; anything else is a failed read.
fn classify_body_error(err: axum::Error) -> ProxyError {
    let mut source = err.source();
    while let Some(cause) = source {
        if cause.is::<LengthLimitError>() {
            return ProxyError::PayloadTooLarge;
        }
        source = cause.source();
    }

    tracing::debug!(target: "gw.handlers.proxy", error = %err, "Failed to read request body");
    ProxyError::RequestBody(err.to_string())
}
