//! Auth Gateway Service Library
//!
//! An HTTP reverse proxy that admits a request only when it carries a
//! signed token that is also present in an external token store, then
//! forwards it unchanged to a single upstream API.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> handlers/proxy.rs -> proxy/forwarder.rs
//!                        |
//!                        v
//!                auth/validator.rs -> repositories/*.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Token validation (signature, time claims, store lookup)
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - Catch-all forwarding handler
//! - `middleware` - Authentication gate and HTTP metrics
//! - `models` - Request, response and identity types
//! - `observability` - Metrics and health endpoints
//! - `proxy` - Upstream forwarding with hooks
//! - `repositories` - Token store backends
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod proxy;
pub mod repositories;
pub mod routes;
