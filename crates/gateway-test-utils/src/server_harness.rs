//! Test server harness for E2E testing
//!
//! Provides `TestGatewayServer` for spawning real gateway instances in tests.

use gateway_service::config::Config;
use gateway_service::proxy::ProxyHooks;
use gateway_service::repositories::TokenStore;
use gateway_service::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::test_config_vars;

/// Test harness for spawning the auth gateway in E2E tests.
///
/// # Example
/// ```rust,ignore
/// let upstream = wiremock::MockServer::start().await;
/// let store = Arc::new(MockTokenStore::empty());
/// let server = TestGatewayServer::spawn(&upstream.uri(), store).await?;
///
/// let response = reqwest::get(format!("{}/orders", server.url())).await?;
/// assert_eq!(response.status(), 401);
/// ```
pub struct TestGatewayServer {
    addr: SocketAddr,
    config: Config,
    _handle: JoinHandle<()>,
}

impl TestGatewayServer {
    /// Spawn a gateway forwarding to `upstream_url` with the given store.
    pub async fn spawn(
        upstream_url: &str,
        store: Arc<dyn TokenStore>,
    ) -> Result<Self, anyhow::Error> {
        Self::spawn_with(test_config_vars(upstream_url), store, ProxyHooks::new()).await
    }

    /// Spawn a gateway from explicit environment variables and extra hooks.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    pub async fn spawn_with(
        vars: HashMap<String, String>,
        store: Arc<dyn TokenStore>,
        hooks: ProxyHooks,
    ) -> Result<Self, anyhow::Error> {
        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(
            AppState::with_hooks(config.clone(), store, hooks)
                .map_err(|e| anyhow::anyhow!("Failed to create app state: {}", e))?,
        );

        // Build routes using the service's real route builder
        let app = routes::build_routes(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        // Spawn server in background
        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestGatewayServer {
    fn drop(&mut self) {
        // Abort the server task so the port is released when the test ends
        self._handle.abort();
    }
}
