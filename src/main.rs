// Authoritative server for the round-based multiplayer trading simulation.
// One actor task per game session; clients stay in sync over WebSockets.

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trading_game_service::{
    api::handlers::{health_check, websocket_handler},
    config::GameConfig,
    session::SessionRegistry,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Set up logging: console plus a daily-rolling file
    std::fs::create_dir_all("logs").ok();
    let file_appender = tracing_appender::rolling::daily("logs", "trading-game.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer().with_writer(non_blocking_file).with_ansi(false);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    std::mem::forget(guard);

    info!("Starting trading game service");

    let config = GameConfig::from_env();
    let registry = Arc::new(SessionRegistry::new(config.clone()));

    let app_state = AppState {
        registry,
        config: config.clone(),
    };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ws/:session_id", get(websocket_handler))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr.as_str()).await?;
    info!("Trading game service listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
