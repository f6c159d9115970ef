// ABOUTME: Full-refresh sync: pages through the whole source table by offset
// ABOUTME: Failures are logged and reported as false; partial copies are left in place

use super::record::CursorValue;
use super::schema::SchemaProvisioner;
use super::state::StateStore;
use super::store::{DestinationStore, SourceStore};
use super::{stamp_batch, SyncContext, TablePlan};
use crate::error::SyncError;

/// Full Syncer.
pub struct FullSyncer<'c, 'a, S: SourceStore, D: DestinationStore, K: StateStore> {
    ctx: &'c SyncContext<'a, S, D, K>,
}

impl<'c, 'a, S: SourceStore, D: DestinationStore, K: StateStore> FullSyncer<'c, 'a, S, D, K> {
    pub fn new(ctx: &'c SyncContext<'a, S, D, K>) -> Self {
        Self { ctx }
    }

    /// Copy the whole table. Returns `false` (after logging) on any failure.
    pub async fn run(&self, plan: &TablePlan) -> bool {
        match self.sync(plan).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Error in full sync of table {}: {}", plan.name(), e);
                false
            }
        }
    }

    /// Copy the whole table, returning the number of rows scanned.
    pub async fn sync(&self, plan: &TablePlan) -> Result<u64, SyncError> {
        let mapping = plan.mapping();
        let table = plan.name();

        SchemaProvisioner::new(self.ctx).ensure(plan).await?;

        let total_records = self
            .ctx
            .source
            .count(&mapping.source_table)
            .await
            .map_err(|source| SyncError::Read {
                table: table.to_string(),
                source,
            })?;
        tracing::info!(
            "Starting full sync of {}. Total records: {}",
            table,
            total_records
        );

        let mut offset = 0u64;
        loop {
            let records = self
                .ctx
                .source
                .fetch_page(
                    &mapping.source_table,
                    plan.source_columns(),
                    &mapping.id_column,
                    self.ctx.settings.batch_size,
                    offset,
                )
                .await
                .map_err(|source| SyncError::Read {
                    table: table.to_string(),
                    source,
                })?;

            if records.is_empty() {
                break;
            }

            let batch_len = records.len() as u64;
            let version = self.ctx.version_marker();
            let stamped = stamp_batch(records, plan, &version);
            self.ctx
                .destination
                .insert(&mapping.clickhouse_table, plan.effective_columns(), &stamped)
                .await
                .map_err(|source| SyncError::Push {
                    table: mapping.clickhouse_table.clone(),
                    source,
                })?;

            offset += batch_len;
            tracing::info!(
                "Table {}: Synced {}/{} records",
                table,
                offset,
                total_records
            );

            if batch_len < self.ctx.settings.batch_size as u64 {
                break;
            }
        }

        // Full mode never resumes from a cursor; the row count is only a marker.
        let marker = i64::try_from(offset)
            .map(CursorValue::Int)
            .unwrap_or_else(|_| CursorValue::Text(offset.to_string()));
        self.ctx.state.save(table, &marker).await;

        Ok(offset)
    }
}
