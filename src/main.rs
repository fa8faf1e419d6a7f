//! travel_records server
//!
//! Loads configuration from the environment (`.env` honoured), opens the
//! Sled store and serves the records API until Ctrl-C.
//!
//! Usage:
//!   cargo run --bin seed_records    # optional sample data
//!   cargo run --bin travel_records  # start server
//!   cargo run --bin travel-cli -- login -u Alice -p password

use tokio::net::TcpListener;

use travel_records::config::AppConfig;
use travel_records::logging;
use travel_records::rest::create_router;
use travel_records::storage::Storage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = AppConfig::from_env()?;
    let _log_guard = logging::init(&config.log)?;

    if config.uses_default_secret() {
        tracing::warn!("TRAVEL_JWT_SECRET not set; signing tokens with the built-in demo secret");
    }

    let storage = Storage::open(&config.data_dir).map_err(|e| {
        tracing::error!(data_dir = %config.data_dir.display(), error = %e, "failed to open store");
        e
    })?;

    let app = create_router(&config, storage.clone());

    let addr = config.socket_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, data_dir = %config.data_dir.display(), users = config.users.len(), "travel records service listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    storage.flush()?;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
