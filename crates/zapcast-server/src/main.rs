//! ZapCast - outreach server entry point

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zapcast_api::AppState;
use zapcast_common::config::Config;
use zapcast_core::{CampaignDispatcher, GatewayClient, ReceiptTracker, TaskSupervisor, WarmupEngine};
use zapcast_storage::{db::DatabasePool, LeadRepository, MessageLogRepository};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    init_logging(&config);

    info!("Starting ZapCast server...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;
    info!("Database connection established");

    // Run migrations
    db_pool.migrate().await?;
    info!("Database migrations completed");

    let pool = db_pool.pool().clone();

    // Gateway client shared by the dispatcher and the warmup engine
    let gateway = GatewayClient::new(config.gateway.clone())?;

    // Supervisor owns every background loop so shutdown can drain them
    let supervisor = TaskSupervisor::new();

    let dispatcher = CampaignDispatcher::new(pool.clone(), gateway.clone(), supervisor.clone());
    let warmup = WarmupEngine::new(
        pool.clone(),
        gateway,
        supervisor.clone(),
        config.warmup.clone(),
    );
    let receipts = ReceiptTracker::new(
        LeadRepository::new(pool.clone()),
        MessageLogRepository::new(pool),
    );

    let state = Arc::new(AppState {
        db_pool,
        dispatcher,
        warmup,
        receipts,
    });

    let app = zapcast_api::create_router(state);

    let addr = format!("{}:{}", config.api.bind_address, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Starting API server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown signal received, stopping background tasks");
    supervisor.shutdown().await;

    info!("ZapCast server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},zapcast=debug", config.logging.level)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
