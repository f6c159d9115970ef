// ABOUTME: Re-pushes recently updated rows that the append-only cursor already passed
// ABOUTME: Relies on ReplacingMergeTree(__ver) to keep the newest version of each row

use super::record::CursorValue;
use super::state::StateStore;
use super::store::{DestinationStore, SourceStore};
use super::{stamp_batch, SyncContext, TablePlan};
use crate::error::SyncError;

/// Recency Refresher.
pub struct RecencyRefresher<'c, 'a, S: SourceStore, D: DestinationStore, K: StateStore> {
    ctx: &'c SyncContext<'a, S, D, K>,
}

impl<'c, 'a, S: SourceStore, D: DestinationStore, K: StateStore> RecencyRefresher<'c, 'a, S, D, K> {
    pub fn new(ctx: &'c SyncContext<'a, S, D, K>) -> Self {
        Self { ctx }
    }

    /// Re-push rows updated within the configured window whose id is at most
    /// `max_cursor`. Returns the number of rows pushed; a mapping without
    /// `update_config` is a no-op.
    pub async fn run(&self, plan: &TablePlan, max_cursor: &CursorValue) -> Result<u64, SyncError> {
        let mapping = plan.mapping();
        let Some(update) = &mapping.update_config else {
            return Ok(0);
        };
        let table = plan.name();

        let records = self
            .ctx
            .source
            .fetch_recent(
                &mapping.source_table,
                plan.source_columns(),
                &mapping.id_column,
                &update.timestamp_column,
                update.update_interval,
                max_cursor,
            )
            .await
            .map_err(|source| SyncError::Read {
                table: table.to_string(),
                source,
            })?;

        if records.is_empty() {
            tracing::info!("No records to update in {}", table);
            return Ok(0);
        }

        let mut pushed = 0u64;
        let mut remaining = records;
        while !remaining.is_empty() {
            let split = remaining.len().min(self.ctx.settings.batch_size);
            let rest = remaining.split_off(split);
            let batch = std::mem::replace(&mut remaining, rest);
            let batch_len = batch.len() as u64;

            let version = self.ctx.version_marker();
            let stamped = stamp_batch(batch, plan, &version);
            self.ctx
                .destination
                .insert(&mapping.clickhouse_table, plan.effective_columns(), &stamped)
                .await
                .map_err(|source| SyncError::Push {
                    table: mapping.clickhouse_table.clone(),
                    source,
                })?;

            pushed += batch_len;
            tracing::info!("Updated {} existing records in {}", batch_len, table);
        }

        Ok(pushed)
    }
}
