// ABOUTME: Cursor-based incremental sync: pushes rows appended since the last cursor
// ABOUTME: Persists the cursor after every acknowledged batch, then runs the recency refresh

use super::recency::RecencyRefresher;
use super::record::{CursorValue, Record};
use super::schema::SchemaProvisioner;
use super::state::StateStore;
use super::store::{DestinationStore, SourceStore};
use super::{stamp_batch, SyncContext, TablePlan};
use crate::error::SyncError;

/// Outcome of one incremental run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncrementalReport {
    pub batches: u64,
    pub rows_synced: u64,
    pub rows_refreshed: u64,
    pub last_id: CursorValue,
}

impl IncrementalReport {
    /// Whether any new rows were pushed.
    pub fn changed(&self) -> bool {
        self.batches > 0
    }
}

/// Incremental Syncer.
pub struct IncrementalSyncer<'c, 'a, S: SourceStore, D: DestinationStore, K: StateStore> {
    ctx: &'c SyncContext<'a, S, D, K>,
}

impl<'c, 'a, S: SourceStore, D: DestinationStore, K: StateStore> IncrementalSyncer<'c, 'a, S, D, K> {
    pub fn new(ctx: &'c SyncContext<'a, S, D, K>) -> Self {
        Self { ctx }
    }

    /// Push every row appended since the persisted cursor.
    ///
    /// On a push failure the error is returned; state written for earlier
    /// batches of this run stays in place. Recency refresh failures are only
    /// logged.
    pub async fn run(&self, plan: &TablePlan) -> Result<IncrementalReport, SyncError> {
        let mapping = plan.mapping();
        let table = plan.name();

        SchemaProvisioner::new(self.ctx).ensure(plan).await?;

        let state = self
            .ctx
            .state
            .load_or_derive(table, self.ctx.destination, plan)
            .await;
        let cursor = state.last_id;

        let max_id = self
            .ctx
            .source
            .max_id(&mapping.source_table, &mapping.id_column)
            .await
            .map_err(|source| SyncError::Read {
                table: table.to_string(),
                source,
            })?
            .unwrap_or_else(CursorValue::zero);

        if max_id <= cursor {
            tracing::info!("Table {}: No new records to sync. Max ID: {}", table, max_id);
            self.ctx.state.save(table, &cursor).await;
            return Ok(IncrementalReport {
                last_id: cursor,
                ..Default::default()
            });
        }

        tracing::info!(
            "Table {}: Found new records. Max ID: {}, Last synced: {}",
            table,
            max_id,
            cursor
        );

        let mut report = IncrementalReport::default();
        let batch_size = self.ctx.settings.batch_size;

        // A fresh non-integer key has no meaningful zero; read from the start.
        let mut lower = if cursor.is_zero() && !matches!(max_id, CursorValue::Int(_)) {
            None
        } else {
            Some(cursor.clone())
        };

        while lower.as_ref().map_or(true, |c| *c < max_id) {
            let records = self
                .ctx
                .source
                .fetch_after(
                    &mapping.source_table,
                    plan.source_columns(),
                    &mapping.id_column,
                    lower.as_ref(),
                    batch_size,
                )
                .await
                .map_err(|source| SyncError::Read {
                    table: table.to_string(),
                    source,
                })?;

            if records.is_empty() {
                break;
            }

            let batch_last = last_cursor(plan, lower.as_ref(), &records)?;
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

            // Only advance once the destination has accepted the batch.
            self.ctx.state.save(table, &batch_last).await;

            report.batches += 1;
            report.rows_synced += batch_len;

            tracing::info!(
                "Table {}: Synced {} records. Progress: {}/{}",
                table,
                batch_len,
                batch_last,
                max_id
            );
            lower = Some(batch_last);
        }

        let cursor = lower.unwrap_or(cursor);

        // New rows are already pushed and persisted; a failed refresh is
        // retried by the next run's window.
        report.rows_refreshed = match RecencyRefresher::new(self.ctx).run(plan, &cursor).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(
                    "Error updating existing records in {} ({}): {}",
                    table,
                    e.operation(),
                    e
                );
                0
            }
        };
        report.last_id = cursor;
        Ok(report)
    }
}

/// Cursor of the batch's last row, verifying that the identifying column is
/// strictly increasing across the batch and beyond the previous cursor, if any.
fn last_cursor(
    plan: &TablePlan,
    previous: Option<&CursorValue>,
    records: &[Record],
) -> Result<CursorValue, SyncError> {
    let id_column = &plan.mapping().id_column;
    let mut last = previous.cloned();

    for record in records {
        let next = record
            .get(id_column)
            .and_then(CursorValue::from_value)
            .ok_or_else(|| SyncError::MissingCursor {
                table: plan.name().to_string(),
                column: id_column.clone(),
            })?;
        if let Some(previous) = last {
            if next <= previous {
                return Err(SyncError::NonMonotonicCursor {
                    table: plan.name().to_string(),
                    column: id_column.clone(),
                    previous,
                    next,
                });
            }
        }
        last = Some(next);
    }

    last.ok_or_else(|| SyncError::MissingCursor {
        table: plan.name().to_string(),
        column: id_column.clone(),
    })
}
