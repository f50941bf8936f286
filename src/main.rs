//! Wager Engine Service
//!
//! Worker process for the wager engine. It migrates the ledger schema,
//! warms the stake board and keeps option multipliers current in the
//! background. Request handling lives in the embedding service.

use std::sync::Arc;
use tracing::{error, info};
use wager_engine::database::{create_pool, run_migrations};
use wager_engine::services::stake_recomputer::DEFAULT_QUEUE_CAPACITY;
use wager_engine::services::AuditTrail;
use wager_engine::{
    AppConfig, AppError, AppResult, PgLedger, StakeCalculator, StakeParams, WagerEngine,
};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    // Load configuration
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        AppError::Config(e)
    })?;

    // Initialize tracing/logging with config
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("wager_engine={},sqlx=warn", config.log_level).into());
    if config.is_production() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Wager engine starting");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);

    // =========================================================================
    // DATABASE
    // =========================================================================
    let pool = create_pool(&config.database).await.map_err(|e| {
        error!("Failed to create database pool: {}", e);
        AppError::Database(e)
    })?;
    info!("✓ Database pool created");

    run_migrations(&pool, None).await.map_err(|e| {
        error!("Database migration failed: {}", e);
        AppError::Database(e)
    })?;
    info!("✓ Migrations applied");

    // =========================================================================
    // ENGINE
    // =========================================================================
    let calculator = StakeCalculator::new(StakeParams::from(&config.stake)).map_err(|e| {
        error!("Invalid stake parameters: {}", e);
        AppError::Config(e.to_string())
    })?;
    info!("Stake parameters: {:?}", calculator.params());

    let audit = Arc::new(AuditTrail::new(&config.audit_log_dir).map_err(|e| {
        error!("Audit trail initialization failed: {}", e);
        e
    })?);

    let ledger = Arc::new(PgLedger::new(pool));
    let (engine, recomputer) = WagerEngine::new(ledger, calculator)
        .with_audit_trail(audit)
        .with_recomputer(DEFAULT_QUEUE_CAPACITY, config.stake.recompute_interval());

    let warmed = engine.warm_board().await.map_err(|e| {
        error!("Failed to warm stake board: {}", e);
        e
    })?;
    info!("✓ Stake board warmed ({} options)", warmed);

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================
    let recomputer_handle = tokio::spawn(async move {
        recomputer.start().await;
    });
    info!(
        "✓ Stake recomputer started ({:?} interval)",
        config.stake.recompute_interval()
    );

    info!("Wager engine ready, press Ctrl+C to shutdown");

    // =========================================================================
    // SHUTDOWN HANDLING
    // =========================================================================
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = recomputer_handle => {
            error!("Stake recomputer exited unexpectedly");
        }
    }

    // Engine owns the recompute sender; dropping it closes the queue
    drop(engine);
    info!("Wager engine shutdown complete");
    Ok(())
}
