// ABOUTME: Prints the persisted sync state of every configured table
// ABOUTME: Reads the state file only; never touches MySQL or ClickHouse

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};

use crate::config::{Config, TableMapping};
use crate::sync::state::StateDocument;
use crate::sync::{FileStateStore, SyncState};

pub async fn status(config: &Config) -> Result<()> {
    let store = FileStateStore::new(&config.state_path);
    let document = store
        .read_document()
        .await
        .with_context(|| format!("Failed to read state file {:?}", config.state_path))?;

    println!("State file: {}", config.state_path.display());
    for line in render_status(&config.tables, &document, Utc::now().timestamp()) {
        println!("{}", line);
    }
    Ok(())
}

/// One line per configured table.
pub fn render_status(tables: &[TableMapping], document: &StateDocument, now: i64) -> Vec<String> {
    tables
        .iter()
        .map(|table| match document.tables.get(&table.source_table) {
            None => format!(
                "{} -> {}: never synced",
                table.source_table, table.clickhouse_table
            ),
            Some(state) => format!(
                "{} -> {}: last_id={} last_sync={} ({})",
                table.source_table,
                table.clickhouse_table,
                state.last_id,
                format_time(state.last_sync_time),
                next_due(state, table.sync_interval, now)
            ),
        })
        .collect()
}

fn format_time(epoch: i64) -> String {
    if epoch <= 0 {
        return "never".to_string();
    }
    Utc.timestamp_opt(epoch, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| epoch.to_string())
}

fn next_due(state: &SyncState, sync_interval: u64, now: i64) -> String {
    if state.is_due(now, sync_interval) {
        "due now".to_string()
    } else {
        let due_at = state.last_sync_time.saturating_add(sync_interval as i64);
        format!("due in {}s", due_at - now)
    }
}
