use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use privacy_inspector::auth::{
    InMemoryNonceLedger, NonceLedger, RedisLedgerConfig, RedisNonceLedger, SystemClock,
};
use privacy_inspector::config::LogFormat;
use privacy_inspector::{AppState, Config, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Install the tracing subscriber with `RUST_LOG` directives (default `info`).
fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Load configuration before logging so LOG_FORMAT applies from the start
    let config = Config::from_env();
    let (level, format) = match &config {
        Ok(c) => (c.log_level.clone(), c.log_format),
        Err(_) => ("info".to_string(), LogFormat::Text),
    };
    init_tracing(&level, format);

    info!(
        "Starting Privacy Inspector API v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = config.map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        allowed_origin = %config.allowed_origin,
        retired_secrets = config.jwt_secret_old.len(),
        challenge_construction = %config.challenge_construction,
        "Configuration loaded"
    );
    for warning in config.warnings() {
        warn!("{warning}");
    }

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    // Nonce store
    let ledger: Arc<dyn NonceLedger> = match &config.redis_url {
        Some(url) => {
            info!("Connecting to Redis nonce store...");
            let ledger = RedisNonceLedger::connect(RedisLedgerConfig::new(url.as_str()))
                .await
                .map_err(|e| {
                    error!("Failed to connect to Redis: {e}");
                    exitcode::UNAVAILABLE
                })?;
            Arc::new(ledger)
        }
        None => {
            warn!("REDIS_URL not set; nonces are kept in memory and not shared between instances");
            Arc::new(InMemoryNonceLedger::new(Arc::new(SystemClock)))
        }
    };

    // Build application state and router
    let state = AppState::new(config.clone(), ledger).map_err(|e| {
        error!("Failed to initialize authentication: {e}");
        exitcode::CONFIG
    })?;
    let app = build_router(state.clone());

    // Start server
    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET  /health          - Health check");
    info!("  POST /api/v1/auth     - Issue a bearer token");
    info!("  POST /api/v1/analyze  - Analyze page privacy");

    // Start server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    // Gracefully shutdown background tasks
    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
