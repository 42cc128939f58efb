//! Overall per-request time budget.
//!
//! Covers authentication, body buffering and the wait for the upstream
//! response head. Exceeding it is reported like an upstream timeout.

use crate::errors::GatewayError;
use crate::proxy::ProxyError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Duration;

/// Answer 504 `Gateway Timeout` when the inner service exceeds `budget`.
pub async fn enforce_request_budget(
    State(budget): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    match tokio::time::timeout(budget, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(
                target: "gw.middleware.request_budget",
                budget_ms = budget.as_millis() as u64,
                "Request exceeded its time budget"
            );
            GatewayError::Proxy(ProxyError::Timeout).into_response()
        }
    }
}
