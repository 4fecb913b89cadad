//! group-orders entry point.
//!
//! Wires configuration, storage and the order service together, then
//! periodically locks orders whose preparation time ran out until the
//! process receives Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use group_orders::config::{LogFormat, OrdersConfig};
use group_orders::ledger::{InMemoryLedger, OrderLedger, PostgresLedger};
use group_orders::service::OrderService;
use group_orders::session::{InMemorySessionStore, PostgresSessionStore, SessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = OrdersConfig::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Plain => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    tracing::info!(
        persistence = config.persistence_enabled,
        sweep_interval_secs = config.expiry_sweep_interval_secs,
        "starting group-orders"
    );

    if config.persistence_enabled {
        let ledger = PostgresLedger::connect(&config)
            .await
            .context("connecting to the order database")?;
        ledger
            .migrate()
            .await
            .context("applying database migrations")?;
        let sessions = PostgresSessionStore::new(ledger.pool().clone());
        run(OrderService::new(Arc::new(ledger), Arc::new(sessions)), &config).await
    } else {
        tracing::warn!("persistence disabled, orders live in memory only");
        let service = OrderService::new(
            Arc::new(InMemoryLedger::new()),
            Arc::new(InMemorySessionStore::new()),
        );
        run(service, &config).await
    }
}

/// Sweeps expired preparation windows until shutdown is requested.
async fn run<L: OrderLedger, S: SessionStore>(
    service: OrderService<L, S>,
    config: &OrdersConfig,
) -> anyhow::Result<()> {
    let period = Duration::from_secs(config.expiry_sweep_interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("listening for shutdown signal")?;
                tracing::info!("shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                match service.close_expired_preparations(chrono::Utc::now()).await {
                    Ok(closed) if !closed.is_empty() => {
                        tracing::info!(count = closed.len(), "closed expired preparations");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::error!(error = %err, "expiry sweep failed"),
                }
            }
        }
    }
}
