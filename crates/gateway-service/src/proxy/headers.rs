//! Hop-by-hop header handling.
//!
//! Hop-by-hop headers describe a single connection and must not cross the
//! proxy in either direction. Headers named in `Connection` are hop-by-hop
//! for that message too.

use axum::http::header::{CONNECTION, CONTENT_LENGTH, HOST};
use axum::http::{HeaderMap, HeaderName};

/// Headers that are always connection-scoped.
pub const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }

    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// Headers for the outbound request.
///
/// `Host` is dropped so the client derives it from the upstream URL, and
/// `Content-Length` so it is recomputed from the (possibly hook-modified)
/// body. Everything else end-to-end, `Authorization` included, is kept.
pub fn outbound_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(HOST);
    headers.remove(CONTENT_LENGTH);
    headers
}

/// Headers relayed back to the client from the upstream response.
pub fn relayed_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = upstream.clone();
    strip_hop_by_hop(&mut headers);
    headers
}
