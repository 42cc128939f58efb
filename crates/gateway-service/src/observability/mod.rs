//! Observability for the auth gateway.
//!
//! Provides metrics definitions and the health/metrics listener.

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
