// ABOUTME: Runs one sync pass over every configured table, sequentially
// ABOUTME: Applies the per-table interval gate and isolates failures to their table

use std::time::Instant;

use super::clock::Clock;
use super::full::FullSyncer;
use super::incremental::IncrementalSyncer;
use super::state::StateStore;
use super::store::{DestinationStore, SourceStore};
use super::{SyncContext, SyncSettings, TablePlan};
use crate::config::{Config, SyncMode, TableMapping};

/// Statistics from one pass.
#[derive(Debug, Clone, Default)]
pub struct PassStats {
    pub tables_synced: usize,
    pub tables_skipped: usize,
    pub rows_synced: u64,
    pub rows_refreshed: u64,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl PassStats {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// What happened to one table during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    /// Interval gate not open yet
    Skipped,
    /// Sync ran; `changed` is false for no-op runs
    Synced {
        changed: bool,
        rows_synced: u64,
        rows_refreshed: u64,
    },
    Failed(String),
}

/// Sync Orchestrator.
///
/// Holds the table plans and settings for the process lifetime; store
/// connections are borrowed per pass.
pub struct Orchestrator {
    plans: Vec<TablePlan>,
    settings: SyncSettings,
}

impl Orchestrator {
    pub fn new(tables: Vec<TableMapping>, settings: SyncSettings) -> Self {
        Self {
            plans: tables.into_iter().map(TablePlan::new).collect(),
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.tables.clone(),
            SyncSettings {
                batch_size: config.batch_size,
                type_defaults: config.type_defaults(),
            },
        )
    }

    pub fn plans(&self) -> &[TablePlan] {
        &self.plans
    }

    /// Run one pass over all tables using the given stores.
    pub async fn run_pass<S, D, K>(
        &self,
        source: &S,
        destination: &D,
        state_store: &K,
        clock: &dyn Clock,
    ) -> PassStats
    where
        S: SourceStore,
        D: DestinationStore,
        K: StateStore,
    {
        let start = Instant::now();
        let mut stats = PassStats::default();
        let ctx = SyncContext::new(source, destination, state_store, clock, &self.settings);

        for plan in &self.plans {
            match self.maybe_sync(&ctx, plan).await {
                TableOutcome::Skipped => stats.tables_skipped += 1,
                TableOutcome::Synced {
                    rows_synced,
                    rows_refreshed,
                    ..
                } => {
                    stats.tables_synced += 1;
                    stats.rows_synced += rows_synced;
                    stats.rows_refreshed += rows_refreshed;
                }
                TableOutcome::Failed(msg) => stats.errors.push(msg),
            }
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        stats
    }

    /// Gate, then dispatch one table to the full or incremental syncer.
    pub async fn maybe_sync<S, D, K>(
        &self,
        ctx: &SyncContext<'_, S, D, K>,
        plan: &TablePlan,
    ) -> TableOutcome
    where
        S: SourceStore,
        D: DestinationStore,
        K: StateStore,
    {
        let mapping = plan.mapping();
        let table = plan.name();

        let state = ctx.state.load(table).await;
        if !state.is_due(ctx.clock.epoch_seconds(), mapping.sync_interval) {
            tracing::debug!("Skipping {}, not ready for sync yet", table);
            return TableOutcome::Skipped;
        }

        tracing::info!("Starting sync for table {}", table);
        match mapping.sync_type {
            SyncMode::Full => {
                let syncer = FullSyncer::new(ctx);
                match syncer.sync(plan).await {
                    Ok(rows) => TableOutcome::Synced {
                        changed: rows > 0,
                        rows_synced: rows,
                        rows_refreshed: 0,
                    },
                    Err(e) => {
                        tracing::error!(
                            "Error in full sync of table {} ({}): {}",
                            table,
                            e.operation(),
                            e
                        );
                        TableOutcome::Failed(format!("Failed to sync {}: {}", table, e))
                    }
                }
            }
            SyncMode::Incremental => match IncrementalSyncer::new(ctx).run(plan).await {
                Ok(report) => TableOutcome::Synced {
                    changed: report.changed(),
                    rows_synced: report.rows_synced,
                    rows_refreshed: report.rows_refreshed,
                },
                Err(e) => {
                    tracing::error!("Error syncing table {} ({}): {}", table, e.operation(), e);
                    TableOutcome::Failed(format!("Failed to sync {}: {}", table, e))
                }
            },
        }
    }
}
