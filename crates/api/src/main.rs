use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use arrival_guard_api::app::{build_push_sender, create_app, AppState, Backends};
use arrival_guard_api::config::Config;
use arrival_guard_api::jobs::{FallbackSweepJob, JobScheduler, PoolMetricsJob, RequestExpiryJob};
use arrival_guard_api::middleware;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    middleware::logging::init_logging(&config.logging);
    middleware::init_metrics().context("Failed to install metrics recorder")?;

    info!("Starting Arrival Guard API v{}", env!("CARGO_PKG_VERSION"));

    let pool = persistence::db::create_pool(&config.database.pool_config()).await?;

    info!("Running database migrations...");
    sqlx::migrate!("../persistence/src/migrations")
        .run(&pool)
        .await?;
    info!("Migrations completed");

    let push = build_push_sender(&config.push)?;
    let addr = config.socket_addr()?;
    let sweep = config.sweep.clone();

    let state = AppState::new(config, Backends::postgres(pool.clone(), push));

    // Triggers do not survive a restart; re-arm what is still active.
    match state.engine.recover_active_alerts().await {
        Ok(report) => info!(
            rearmed = report.rearmed,
            left_to_sweep = report.left_to_sweep,
            "Recovered active alerts"
        ),
        Err(e) => warn!(error = %e, "Failed to recover active alerts; relying on the sweep"),
    }

    let mut scheduler = JobScheduler::new();
    if sweep.enabled {
        scheduler.register(FallbackSweepJob::new(
            state.engine.clone(),
            Duration::from_secs(sweep.interval_secs),
        ));
    }
    scheduler.register(RequestExpiryJob::new(state.requests.clone()));
    scheduler.register(PoolMetricsJob::new(pool));
    scheduler.start();

    let app = create_app(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(10)).await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
