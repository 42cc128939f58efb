//! HTTP metrics middleware.
//!
//! Applied as the outermost layer on the gateway router so rejected,
//! timed-out and forwarded requests are all counted.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::observability::metrics::record_http_request;

/// Records method, status and duration for every response.
///
/// Duration covers the time to the response head; streamed bodies may
/// continue after it is recorded.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    let response = next.run(request).await;

    record_http_request(&method, response.status().as_u16(), start.elapsed());

    response
}
