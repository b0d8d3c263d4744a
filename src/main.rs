//! Watchdesk server - request approval desk and duty handover bot

use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchdesk::config::Config;
use watchdesk::gateway::TelegramGateway;
use watchdesk::store::Store;
use watchdesk::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "watchdesk=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();

    // Database connection
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    // Run migrations
    Store::new(pool.clone()).migrate().await?;

    let gateway = Arc::new(TelegramGateway::new(
        config.telegram_api_url.clone(),
        config.bot_token.clone(),
    ));
    let state = AppState::new(pool, gateway, config.webhook_secret.clone());
    let app = watchdesk::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
