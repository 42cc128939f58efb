//! Request, response and identity models for the auth gateway.

use axum::{
    body::Body,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON body used for every response the gateway generates itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Authenticated caller, produced by a successful token validation.
///
/// Lives for a single request. The subject id is redacted in Debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject_id: String,
}

impl Identity {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("subject_id", &"[REDACTED]")
            .finish()
    }
}

/// Inbound request as seen by the forwarding proxy and its pre-send hook.
///
/// `path` and `query` are relative to the gateway root and are appended to
/// the upstream base URL unchanged. Headers still include hop-by-hop entries
/// at this point; the proxy strips them after the hook has run.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Set by the auth middleware for every request that reaches the proxy.
    pub identity: Option<Identity>,
}

impl RequestContext {
    /// Path plus `?query` when a query string is present.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}

/// Upstream response on its way back to the client.
///
/// The body is a stream; a post-receive hook may replace it but should not
/// need to buffer it.
#[derive(Debug)]
pub struct ResponseContext {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl IntoResponse for ResponseContext {
    fn into_response(self) -> Response {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
