//! Middleware for the auth gateway.

pub mod auth;
pub mod http_metrics;
pub mod request_budget;

pub use auth::{require_auth, AuthState};
pub use http_metrics::http_metrics_middleware;
pub use request_budget::enforce_request_budget;
