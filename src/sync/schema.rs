// ABOUTME: Creates the ClickHouse table for a mapping when it does not exist yet
// ABOUTME: Derives columns from the MySQL catalog and uses ReplacingMergeTree keyed by __ver

use super::store::{DestinationStore, SourceColumnType, SourceStore};
use super::typemap::{self, TypeMap};
use super::{SyncContext, TablePlan, VERSION_COLUMN, VERSION_COLUMN_TYPE};
use crate::config::TableMapping;
use crate::error::SyncError;
use crate::sync::state::StateStore;
use crate::utils::{quote_ident, quote_table};
use std::collections::HashMap;

/// Schema Provisioner.
///
/// Existing tables are left untouched; there is no schema diffing.
pub struct SchemaProvisioner<'c, 'a, S: SourceStore, D: DestinationStore, K: StateStore> {
    ctx: &'c SyncContext<'a, S, D, K>,
}

impl<'c, 'a, S: SourceStore, D: DestinationStore, K: StateStore> SchemaProvisioner<'c, 'a, S, D, K> {
    pub fn new(ctx: &'c SyncContext<'a, S, D, K>) -> Self {
        Self { ctx }
    }

    /// Ensure the destination table exists. Returns `true` if it was created.
    pub async fn ensure(&self, plan: &TablePlan) -> Result<bool, SyncError> {
        let mapping = plan.mapping();

        let exists = self
            .ctx
            .destination
            .table_exists(&mapping.clickhouse_table)
            .await
            .map_err(|source| SyncError::Provision {
                table: mapping.clickhouse_table.clone(),
                source,
            })?;
        if exists {
            return Ok(false);
        }

        let source_types = self
            .ctx
            .source
            .column_types(&mapping.source_table, &mapping.columns)
            .await
            .map_err(|source| SyncError::Metadata {
                table: mapping.source_table.clone(),
                source,
            })?;

        let ddl = build_create_table(mapping, &source_types, &self.ctx.settings.type_defaults)?;
        tracing::debug!("Creating ClickHouse table with: {}", ddl);

        self.ctx
            .destination
            .execute(&ddl)
            .await
            .map_err(|source| SyncError::Provision {
                table: mapping.clickhouse_table.clone(),
                source,
            })?;

        tracing::info!("Created table {} in ClickHouse", mapping.clickhouse_table);
        Ok(true)
    }
}

/// Build the `CREATE TABLE` statement for a mapping.
pub fn build_create_table(
    mapping: &TableMapping,
    source_types: &HashMap<String, SourceColumnType>,
    defaults: &TypeMap,
) -> Result<String, SyncError> {
    let sort_key = mapping.order_by_columns();
    let mut columns_def = Vec::with_capacity(mapping.columns.len() + 1);
    for column in &mapping.columns {
        let source_type = source_types
            .get(column)
            .ok_or_else(|| SyncError::MissingColumn {
                table: mapping.source_table.clone(),
                column: column.clone(),
            })?;
        let mut ch_type = typemap::resolve(mapping, column, source_type, defaults);
        // ClickHouse rejects Nullable columns in the sorting key.
        if sort_key.contains(column) {
            ch_type = strip_nullable(&ch_type).to_string();
        }
        columns_def.push(format!("{} {}", quote_ident(column), ch_type));
    }
    columns_def.push(format!("{} {}", quote_ident(VERSION_COLUMN), VERSION_COLUMN_TYPE));

    let order_by = sort_key
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let partition_clause = match &mapping.partition_by {
        Some(expr) if !expr.trim().is_empty() => format!("\nPARTITION BY {}", expr.trim()),
        _ => String::new(),
    };

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {}\n(\n    {}\n)\nENGINE = ReplacingMergeTree({}){}\nORDER BY ({})",
        quote_table(&mapping.clickhouse_table),
        columns_def.join(",\n    "),
        quote_ident(VERSION_COLUMN),
        partition_clause,
        order_by
    ))
}

fn strip_nullable(ch_type: &str) -> &str {
    ch_type
        .strip_prefix("Nullable(")
        .and_then(|inner| inner.strip_suffix(')'))
        .unwrap_or(ch_type)
}
