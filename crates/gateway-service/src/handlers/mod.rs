//! HTTP request handlers for the auth gateway.

mod proxy;

pub use proxy::forward_request;
