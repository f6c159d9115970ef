// ABOUTME: Sync daemon - runs orchestrator passes on a fixed poll interval
// ABOUTME: Opens fresh store connections per pass and stops cleanly on Ctrl-C

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::clickhouse::ClickHouseClient;
use crate::config::Config;
use crate::mysql::MySqlSource;
use crate::sync::{FileStateStore, Orchestrator, PassStats, SystemClock};
use crate::utils::retry_with_backoff;

const CONNECT_RETRIES: u32 = 3;
const CONNECT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Run sync passes every `poll_interval` seconds, or a single pass when `once` is set.
pub async fn run(config: &Config, once: bool) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config);
    let state_store = FileStateStore::new(&config.state_path);

    tracing::info!(
        "Starting sync of {} tables (poll_interval={}s, batch_size={}, state={:?})",
        orchestrator.plans().len(),
        config.poll_interval,
        config.batch_size,
        config.state_path
    );

    if once {
        let stats = run_pass(config, &orchestrator, &state_store)
            .await
            .context("Sync pass failed")?;
        if !stats.is_success() {
            anyhow::bail!("Sync pass finished with {} table errors", stats.errors.len());
        }
        return Ok(());
    }

    let mut ticker = interval(Duration::from_secs(config.poll_interval));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut passes = 0u64;

    loop {
        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received, stopping sync");
                break;
            }
            _ = ticker.tick() => {
                passes += 1;
                tracing::info!("Starting sync pass {}", passes);

                tokio::select! {
                    biased;
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Shutdown signal received during sync pass, aborting");
                        break;
                    }
                    result = run_pass(config, &orchestrator, &state_store) => {
                        if let Err(e) = result {
                            tracing::error!("Sync pass {} failed: {:#}", passes, e);
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Connect both stores, run one orchestrator pass and disconnect.
///
/// A connection failure aborts the pass; table failures are only counted.
async fn run_pass(
    config: &Config,
    orchestrator: &Orchestrator,
    state_store: &FileStateStore,
) -> Result<PassStats> {
    let source = retry_with_backoff(
        || MySqlSource::connect(&config.mysql),
        CONNECT_RETRIES,
        CONNECT_INITIAL_DELAY,
    )
    .await
    .context("Failed to connect to MySQL")?;

    let destination = match retry_with_backoff(
        || ClickHouseClient::connect(&config.clickhouse),
        CONNECT_RETRIES,
        CONNECT_INITIAL_DELAY,
    )
    .await
    {
        Ok(client) => client,
        Err(e) => {
            if let Err(close_err) = source.disconnect().await {
                tracing::warn!("Failed to close MySQL pool: {}", close_err);
            }
            return Err(e).context("Failed to connect to ClickHouse");
        }
    };

    let stats = orchestrator
        .run_pass(&source, &destination, state_store, &SystemClock)
        .await;

    tracing::info!(
        "Sync pass completed: {} tables synced, {} skipped, {} rows synced, {} rows refreshed in {}ms",
        stats.tables_synced,
        stats.tables_skipped,
        stats.rows_synced,
        stats.rows_refreshed,
        stats.duration_ms
    );
    if !stats.is_success() {
        tracing::warn!("Sync pass had {} errors", stats.errors.len());
    }

    if let Err(e) = source.disconnect().await {
        tracing::warn!("Failed to close MySQL pool: {}", e);
    }

    Ok(stats)
}
