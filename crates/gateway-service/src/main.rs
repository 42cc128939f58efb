//! Auth Gateway
//!
//! Entry point for the token-checking reverse proxy. Serves the gateway on
//! `BIND_ADDRESS` and health/metrics on `HEALTH_BIND_ADDRESS`.

use gateway_service::config::Config;
use gateway_service::observability::health::health_and_metrics_router;
use gateway_service::observability::metrics::init_metrics_recorder;
use gateway_service::observability::HealthState;
use gateway_service::repositories::connect_token_store;
use gateway_service::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting Auth Gateway");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        upstream = %config.upstream_base_url,
        bind_address = %config.bind_address,
        health_bind_address = %config.health_bind_address,
        token_store = config.token_store.backend(),
        jwt_algorithm = %config.jwt_algorithm,
        "Configuration loaded successfully"
    );

    // Initialize metrics recorder before anything records
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to initialize metrics recorder");
        e
    })?;

    info!("Connecting to token store...");
    let store = connect_token_store(&config).await.map_err(|e| {
        error!(error = %e, "Failed to connect to token store");
        e
    })?;

    match store.ping().await {
        Ok(()) => info!(backend = store.backend(), "Token store reachable"),
        // Requests will be denied until the store recovers
        Err(e) => warn!(backend = store.backend(), error = %e, "Token store ping failed"),
    }

    let bind_address = config.bind_address.clone();
    let health_bind_address = config.health_bind_address.clone();
    let drain_secs = config.drain_seconds;

    let state = Arc::new(AppState::new(config, store).map_err(|e| {
        error!(error = %e, "Failed to build upstream HTTP client");
        e
    })?);
    let app = routes::build_routes(state);

    let shutdown_token = CancellationToken::new();
    let health_state = Arc::new(HealthState::new());

    // Start health server (fail startup if it cannot bind)
    let health_addr: SocketAddr = health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;
    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;

    let health_app = health_and_metrics_router(Arc::clone(&health_state), prometheus_handle);
    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(health_listener, health_app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    health_state.set_ready();
    info!("Auth Gateway listening on {}", addr);

    let server_shutdown = {
        let token = shutdown_token.clone();
        let health_state = Arc::clone(&health_state);
        async move {
            shutdown_signal().await;

            // Stop receiving new traffic before draining
            health_state.set_not_ready();
            drain(drain_secs).await;
            token.cancel();
        }
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(server_shutdown)
    .await?;

    shutdown_token.cancel();
    info!("Auth Gateway shutdown complete");

    Ok(())
}

/// Initialize tracing. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gateway_service=info,auth_gateway=info,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn drain(drain_secs: u64) {
    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (DRAIN_SECONDS=0)");
    }
}
