//! Forwarding proxy.
//!
//! Relays authorized requests to the upstream API and streams the upstream
//! response back. Upstream failures are never retried.

pub mod forwarder;
pub mod headers;
pub mod hooks;

pub use forwarder::ForwardingProxy;
pub use hooks::{subject_header_hook, PostReceiveHook, PreSendHook, ProxyHooks};

use thiserror::Error;

/// Forwarding failures.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Upstream could not be reached or the exchange failed.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// Upstream did not answer within the upstream timeout.
    #[error("upstream timed out")]
    Timeout,

    /// Inbound body exceeded the buffering limit.
    #[error("request body exceeds limit")]
    PayloadTooLarge,

    /// Inbound body could not be read, e.g. the client went away mid-upload.
    #[error("failed to read request body: {0}")]
    RequestBody(String),
}
