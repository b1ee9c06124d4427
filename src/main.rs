//! mei-friend-web binary entry point

use mei_friend_web::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Load .env and configuration
/// 2. Initialize tracing/logging from `logging.*`
/// 3. Initialize metrics and AppState
/// 4. Build Axum router
/// 5. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // 1. Load configuration; no subscriber yet, so errors go to stderr
    let config = match config::AppConfig::load() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("mei-friend-web: {error}");
            return Err(error.into());
        }
    };

    // 2. Initialize tracing/logging
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.log_filter().into())
    };
    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!(
        domain = %config.server.domain,
        protocol = %config.server.protocol,
        "Starting mei-friend-web..."
    );
    config.log_warnings();

    // 3. Initialize metrics
    mei_friend_web::metrics::init_metrics();

    let state = AppState::new(config.clone())?;

    let app = mei_friend_web::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Public URL: {}", config.server.base_url());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
