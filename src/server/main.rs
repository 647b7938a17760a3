use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use apex_license::activation::ActivationManager;
use apex_license::clock::SystemClock;
use apex_license::config::{get_config, ApexConfig};
use apex_license::errors::{LicenseError, LicenseResult};
use apex_license::server::{build_router, AppState};
use apex_license::store::LicenseStore;

fn init_tracing(config: &ApexConfig) {
    if !config.logging.enabled {
        return;
    }
    let level = config
        .logging
        .level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutdown signal received");
}

async fn run() -> LicenseResult<()> {
    let config = get_config()?;
    init_tracing(config);

    let store = LicenseStore::connect(&config.database).await?;
    let manager = Arc::new(ActivationManager::new(
        store,
        config,
        Arc::new(SystemClock),
    ));
    let app = build_router(AppState::new(manager), &config.rate_limit);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| LicenseError::ServerError(format!("failed to bind {addr}: {e}")))?;
    info!("APEX license server listening on http://{addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| LicenseError::ServerError(format!("server error: {e}")))
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("apex_license_server: {e}");
        std::process::exit(1);
    }
}
