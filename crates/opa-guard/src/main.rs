//! OPA Guard
//!
//! Standalone host for the guard: every request except `/health` and
//! `/metrics` must carry a bearer token that verifies against the configured
//! key sources and is allowed by the configured policy package.

use opa_guard::auth::JwtVerifier;
use opa_guard::config::Config;
use opa_guard::guard::RequestGuard;
use opa_guard::keys::{build_http_client, register_configured_sources, PublicKeyLoader};
use opa_guard::observability::metrics::init_metrics_recorder;
use opa_guard::policy::PolicyClient;
use opa_guard::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "opa_guard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting OPA guard");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        key_sources = config.key_sources.len(),
        jwt_clock_skew_seconds = config.jwt_clock_skew.as_secs(),
        disable_auth = config.disable_auth,
        disable_opa = config.disable_opa,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    // One client for key sources and the policy engine
    let http = build_http_client();

    let loader = Arc::new(PublicKeyLoader::new());
    register_configured_sources(&loader, &config.key_sources, &http)
        .await
        .map_err(|e| {
            error!("Invalid key source: {}", e);
            e
        })?;

    info!(
        key_count = loader.key_count(),
        source_count = loader.source_count(),
        "Key sources registered"
    );

    let verifier = Arc::new(JwtVerifier::new(loader.clone(), config.jwt_clock_skew));
    let policy = Arc::new(PolicyClient::new(config.policy_config(), http));
    let guard = Arc::new(RequestGuard::new(config.guard_config(), verifier, policy));

    let state = Arc::new(AppState {
        guard,
        loader,
        metrics_handle,
    });

    let app = routes::build_routes(state);

    // Parse bind address
    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("OPA guard listening on {}", addr);

    // Start server with graceful shutdown support
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("OPA guard shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
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

    let drain_secs: u64 = std::env::var("GUARD_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    }
}
