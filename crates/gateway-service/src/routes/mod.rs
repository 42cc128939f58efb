//! HTTP routes for the auth gateway.
//!
//! Defines the Axum router and application state. The gateway has no routes
//! of its own: every method and path falls through to the proxy handler,
//! behind the auth middleware.

use crate::auth::TokenValidator;
use crate::config::Config;
use crate::handlers;
use crate::middleware::{
    enforce_request_budget, http_metrics_middleware, require_auth, AuthState,
};
use crate::proxy::{subject_header_hook, ForwardingProxy, ProxyHooks};
use crate::repositories::TokenStore;
use axum::{body::Body, http::HeaderName, http::Request, middleware, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Token validator shared with the auth middleware.
    pub validator: Arc<TokenValidator>,

    /// Upstream forwarder.
    pub proxy: Arc<ForwardingProxy>,
}

impl AppState {
    /// Build state with the hooks implied by configuration.
    ///
    /// # Errors
    ///
    /// Returns the HTTP client build error from the proxy.
    pub fn new(config: Config, store: Arc<dyn TokenStore>) -> Result<Self, reqwest::Error> {
        Self::with_hooks(config, store, ProxyHooks::new())
    }

    /// Build state with extra hooks, run after the configured ones.
    ///
    /// # Errors
    ///
    /// Returns the HTTP client build error from the proxy.
    pub fn with_hooks(
        config: Config,
        store: Arc<dyn TokenStore>,
        extra: ProxyHooks,
    ) -> Result<Self, reqwest::Error> {
        let validator = Arc::new(TokenValidator::new(&config, store));
        let hooks = configured_hooks(&config, extra);
        let proxy = Arc::new(ForwardingProxy::new(&config, hooks)?);

        Ok(Self {
            config,
            validator,
            proxy,
        })
    }
}

/// Hooks implied by configuration, followed by `extra`.
fn configured_hooks(config: &Config, extra: ProxyHooks) -> ProxyHooks {
    let mut hooks = ProxyHooks::new();

    if let Some(name) = &config.upstream_subject_header {
        match HeaderName::from_bytes(name.as_bytes()) {
            Ok(name) => hooks = hooks.with_pre_send(subject_header_hook(name)),
            Err(e) => {
                tracing::warn!(target: "gw.routes", error = %e, "Ignoring invalid subject header name");
            }
        }
    }

    hooks.then(extra)
}

/// Build the gateway router.
///
/// Layer order (outermost first):
/// 1. HTTP metrics - counts every response
/// 2. Request budget - 504 once the overall per-request time is spent
/// 3. TraceLayer - request span with a correlation id
/// 4. Auth middleware - rejects before anything reaches the proxy
/// 5. Fallback handler - forwards upstream
pub fn build_routes(state: Arc<AppState>) -> Router {
    let auth_state = Arc::new(AuthState {
        validator: Arc::clone(&state.validator),
    });
    let request_timeout = state.config.request_timeout;

    Router::new()
        .fallback(handlers::forward_request)
        .with_state(state)
        .layer(middleware::from_fn_with_state(auth_state, require_auth))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "gw.request",
                    method = %request.method(),
                    request_id = %Uuid::new_v4(),
                )
            }),
        )
        .layer(middleware::from_fn_with_state(
            request_timeout,
            enforce_request_budget,
        ))
        .layer(middleware::from_fn(http_metrics_middleware))
}
