// ABOUTME: End-to-end tests of the sync engine against in-memory stores
// ABOUTME: Covers provisioning, cursor resume, the interval gate, full and recency sync

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use mysql_clickhouse_sync::config::{SyncMode, TableMapping, UpdateConfig};
use mysql_clickhouse_sync::error::{DestinationError, SourceError, SyncError};
use mysql_clickhouse_sync::sync::{
    Clock, CursorValue, DestinationStore, FullSyncer, IncrementalSyncer, MemoryStateStore,
    Orchestrator, Record, SourceColumnType, SourceStore, StateStore, SyncContext, SyncSettings,
    TablePlan, Value, VERSION_COLUMN,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const START: i64 = 1_700_000_000;

struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    fn new() -> Self {
        Self {
            now: Mutex::new(Utc.timestamp_opt(START, 0).unwrap()),
        }
    }

    fn advance(&self, secs: i64) {
        *self.now.lock().unwrap() += Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Source table with columns `id`, `name`, `updated_at` (epoch seconds).
#[derive(Default)]
struct FakeTable {
    rows: Vec<(i64, String, i64)>,
}

#[derive(Default)]
struct FakeSource {
    tables: Mutex<HashMap<String, FakeTable>>,
    now: Mutex<i64>,
    fetches: AtomicUsize,
}

impl FakeSource {
    fn with_table(name: &str, ids: impl IntoIterator<Item = i64>) -> Self {
        let source = FakeSource {
            now: Mutex::new(START),
            ..Default::default()
        };
        source.add_rows(name, ids);
        source
    }

    fn add_rows(&self, table: &str, ids: impl IntoIterator<Item = i64>) {
        let old = *self.now.lock().unwrap() - 100_000;
        let mut tables = self.tables.lock().unwrap();
        let entry = tables.entry(table.to_string()).or_default();
        for id in ids {
            entry.rows.push((id, format!("row-{}", id), old));
        }
    }

    fn touch(&self, table: &str, id: i64) {
        let now = *self.now.lock().unwrap();
        let mut tables = self.tables.lock().unwrap();
        for row in tables.get_mut(table).unwrap().rows.iter_mut() {
            if row.0 == id {
                row.1 = format!("row-{}-updated", id);
                row.2 = now;
            }
        }
    }

    fn advance(&self, secs: i64) {
        *self.now.lock().unwrap() += secs;
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn sorted_rows(&self, table: &str) -> Result<Vec<(i64, String, i64)>, SourceError> {
        let tables = self.tables.lock().unwrap();
        let fake = tables
            .get(table)
            .ok_or_else(|| SourceError::Query(format!("Table '{}' doesn't exist", table)))?;
        let mut rows = fake.rows.clone();
        rows.sort_by_key(|r| r.0);
        Ok(rows)
    }
}

fn to_record(columns: &Arc<[String]>, row: &(i64, String, i64)) -> Record {
    let values = columns
        .iter()
        .map(|c| match c.as_str() {
            "id" => Value::Int(row.0),
            "name" => Value::Text(row.1.clone()),
            "updated_at" => Value::Int(row.2),
            other => panic!("unknown column {}", other),
        })
        .collect();
    Record::new(Arc::clone(columns), values).unwrap()
}

#[async_trait]
impl SourceStore for FakeSource {
    async fn ping(&self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn column_types(
        &self,
        table: &str,
        columns: &[String],
    ) -> Result<HashMap<String, SourceColumnType>, SourceError> {
        self.sorted_rows(table)?;
        Ok(columns
            .iter()
            .map(|c| {
                let ty = match c.as_str() {
                    "name" => SourceColumnType::new("varchar", "varchar(255)"),
                    _ => SourceColumnType::new("bigint", "bigint(20)"),
                };
                (c.clone(), ty)
            })
            .collect())
    }

    async fn max_id(&self, table: &str, _id_column: &str) -> Result<Option<CursorValue>, SourceError> {
        Ok(self
            .sorted_rows(table)?
            .last()
            .map(|r| CursorValue::Int(r.0)))
    }

    async fn count(&self, table: &str) -> Result<u64, SourceError> {
        Ok(self.sorted_rows(table)?.len() as u64)
    }

    async fn fetch_after(
        &self,
        table: &str,
        columns: &Arc<[String]>,
        _id_column: &str,
        after: Option<&CursorValue>,
        limit: usize,
    ) -> Result<Vec<Record>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .sorted_rows(table)?
            .iter()
            .filter(|r| after.map_or(true, |a| CursorValue::Int(r.0) > *a))
            .take(limit)
            .map(|r| to_record(columns, r))
            .collect())
    }

    async fn fetch_page(
        &self,
        table: &str,
        columns: &Arc<[String]>,
        _id_column: &str,
        limit: usize,
        offset: u64,
    ) -> Result<Vec<Record>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .sorted_rows(table)?
            .iter()
            .skip(offset as usize)
            .take(limit)
            .map(|r| to_record(columns, r))
            .collect())
    }

    async fn fetch_recent(
        &self,
        table: &str,
        columns: &Arc<[String]>,
        _id_column: &str,
        _timestamp_column: &str,
        window_secs: u64,
        max_cursor: &CursorValue,
    ) -> Result<Vec<Record>, SourceError> {
        let cutoff = *self.now.lock().unwrap() - window_secs as i64;
        Ok(self
            .sorted_rows(table)?
            .iter()
            .filter(|r| r.2 > cutoff && CursorValue::Int(r.0) <= *max_cursor)
            .map(|r| to_record(columns, r))
            .collect())
    }
}

#[derive(Default)]
struct FakeDestination {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    ddl: Mutex<Vec<String>>,
    insert_calls: AtomicUsize,
    /// 1-based insert call numbers that fail
    fail_inserts: Mutex<HashSet<usize>>,
}

impl FakeDestination {
    fn with_rows(table: &str, columns: &[&str], ids: impl IntoIterator<Item = i64>) -> Self {
        let dest = FakeDestination::default();
        let cols: Arc<[String]> = columns.iter().map(|c| c.to_string()).collect::<Vec<_>>().into();
        let rows = ids
            .into_iter()
            .map(|id| to_record(&cols, &(id, format!("row-{}", id), 0)))
            .collect();
        dest.tables.lock().unwrap().insert(table.to_string(), rows);
        dest
    }

    fn fail_insert(&self, call: usize) {
        self.fail_inserts.lock().unwrap().insert(call);
    }

    fn clear_failures(&self) {
        self.fail_inserts.lock().unwrap().clear();
    }

    fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    fn ids(&self, table: &str) -> Vec<i64> {
        self.rows(table)
            .iter()
            .map(|r| match r.get("id") {
                Some(Value::Int(id)) => *id,
                other => panic!("unexpected id {:?}", other),
            })
            .collect()
    }

    fn ddl_count(&self) -> usize {
        self.ddl.lock().unwrap().len()
    }

    fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DestinationStore for FakeDestination {
    async fn ping(&self) -> Result<(), DestinationError> {
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<(), DestinationError> {
        let name = sql
            .strip_prefix("CREATE TABLE IF NOT EXISTS ")
            .and_then(|rest| rest.split_whitespace().next())
            .map(|n| n.trim_matches('`').to_string())
            .ok_or_else(|| DestinationError::Server {
                code: Some(62),
                message: format!("unsupported statement: {}", sql),
            })?;
        self.ddl.lock().unwrap().push(sql.to_string());
        self.tables.lock().unwrap().entry(name).or_default();
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, DestinationError> {
        Ok(self.tables.lock().unwrap().contains_key(table))
    }

    async fn max_value(&self, table: &str, column: &str) -> Result<Option<CursorValue>, DestinationError> {
        let tables = self.tables.lock().unwrap();
        let rows = tables
            .get(table)
            .ok_or_else(|| DestinationError::NotFound(table.to_string()))?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get(column).and_then(CursorValue::from_value))
            .max())
    }

    async fn insert(
        &self,
        table: &str,
        columns: &[String],
        records: &[Record],
    ) -> Result<(), DestinationError> {
        let call = self.insert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_inserts.lock().unwrap().contains(&call) {
            return Err(DestinationError::Server {
                code: Some(241),
                message: "Memory limit exceeded".to_string(),
            });
        }
        for record in records {
            assert_eq!(record.columns(), columns);
        }
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .extend(records.iter().cloned());
        Ok(())
    }
}

/// Source table with columns `id`, `name` whose key is not an integer column.
struct KeyedSource {
    data_type: &'static str,
    column_type: &'static str,
    ids: Vec<Value>,
}

impl KeyedSource {
    fn new(data_type: &'static str, column_type: &'static str, ids: Vec<Value>) -> Self {
        let mut ids = ids;
        ids.sort_by_key(|id| CursorValue::from_value(id).unwrap());
        Self {
            data_type,
            column_type,
            ids,
        }
    }

    fn record(columns: &Arc<[String]>, id: &Value) -> Record {
        let values = columns
            .iter()
            .map(|c| match c.as_str() {
                "id" => id.clone(),
                "name" => Value::Text(format!("row-{:?}", id)),
                other => panic!("unknown column {}", other),
            })
            .collect();
        Record::new(Arc::clone(columns), values).unwrap()
    }
}

#[async_trait]
impl SourceStore for KeyedSource {
    async fn ping(&self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn column_types(
        &self,
        _table: &str,
        columns: &[String],
    ) -> Result<HashMap<String, SourceColumnType>, SourceError> {
        Ok(columns
            .iter()
            .map(|c| {
                let ty = match c.as_str() {
                    "id" => SourceColumnType::new(self.data_type, self.column_type),
                    _ => SourceColumnType::new("varchar", "varchar(255)"),
                };
                (c.clone(), ty)
            })
            .collect())
    }

    async fn max_id(&self, _table: &str, _id_column: &str) -> Result<Option<CursorValue>, SourceError> {
        Ok(self.ids.last().and_then(CursorValue::from_value))
    }

    async fn count(&self, _table: &str) -> Result<u64, SourceError> {
        Ok(self.ids.len() as u64)
    }

    async fn fetch_after(
        &self,
        _table: &str,
        columns: &Arc<[String]>,
        _id_column: &str,
        after: Option<&CursorValue>,
        limit: usize,
    ) -> Result<Vec<Record>, SourceError> {
        Ok(self
            .ids
            .iter()
            .filter(|id| after.map_or(true, |a| CursorValue::from_value(id).unwrap() > *a))
            .take(limit)
            .map(|id| Self::record(columns, id))
            .collect())
    }

    async fn fetch_page(
        &self,
        _table: &str,
        columns: &Arc<[String]>,
        _id_column: &str,
        limit: usize,
        offset: u64,
    ) -> Result<Vec<Record>, SourceError> {
        Ok(self
            .ids
            .iter()
            .skip(offset as usize)
            .take(limit)
            .map(|id| Self::record(columns, id))
            .collect())
    }

    async fn fetch_recent(
        &self,
        _table: &str,
        _columns: &Arc<[String]>,
        _id_column: &str,
        _timestamp_column: &str,
        _window_secs: u64,
        _max_cursor: &CursorValue,
    ) -> Result<Vec<Record>, SourceError> {
        Ok(Vec::new())
    }
}

fn keyed_ids(dest: &FakeDestination, table: &str) -> Vec<Value> {
    dest.rows(table)
        .iter()
        .map(|r| r.get("id").cloned().unwrap())
        .collect()
}

fn orders_mapping() -> TableMapping {
    TableMapping::new("orders", "orders_ch", &["id", "name", "updated_at"], "id")
}

fn settings(batch_size: usize) -> SyncSettings {
    SyncSettings {
        batch_size,
        ..Default::default()
    }
}

fn version_of(record: &Record) -> NaiveDateTime {
    match record.get(VERSION_COLUMN) {
        Some(Value::DateTime(v)) => *v,
        other => panic!("missing version marker: {:?}", other),
    }
}

#[tokio::test]
async fn test_incremental_sync_end_to_end() {
    let source = FakeSource::with_table("orders", 1..=3);
    let dest = FakeDestination::default();
    let state = MemoryStateStore::new();
    let clock = ManualClock::new();
    let orchestrator = Orchestrator::new(vec![orders_mapping()], settings(1000));

    let stats = orchestrator.run_pass(&source, &dest, &state, &clock).await;
    assert!(stats.is_success(), "errors: {:?}", stats.errors);
    assert_eq!(stats.rows_synced, 3);
    assert_eq!(dest.ids("orders_ch"), vec![1, 2, 3]);
    for row in dest.rows("orders_ch") {
        assert_eq!(row.columns(), &["id", "name", "updated_at", "__ver"]);
        version_of(&row);
    }
    let saved = state.get("orders").unwrap();
    assert_eq!(saved.last_id, CursorValue::Int(3));
    assert_eq!(saved.last_sync_time, START);

    source.add_rows("orders", [4]);
    clock.advance(3600);
    let stats = orchestrator.run_pass(&source, &dest, &state, &clock).await;
    assert_eq!(stats.rows_synced, 1);
    assert_eq!(dest.ids("orders_ch"), vec![1, 2, 3, 4]);
    assert_eq!(state.get("orders").unwrap().last_id, CursorValue::Int(4));
}

#[tokio::test]
async fn test_provisioning_is_idempotent() {
    let source = FakeSource::with_table("orders", 1..=2);
    let dest = FakeDestination::default();
    let state = MemoryStateStore::new();
    let clock = ManualClock::new();
    let orchestrator = Orchestrator::new(vec![orders_mapping()], settings(1000));

    orchestrator.run_pass(&source, &dest, &state, &clock).await;
    clock.advance(3600);
    orchestrator.run_pass(&source, &dest, &state, &clock).await;

    assert_eq!(dest.ddl_count(), 1);
    let ddl = dest.ddl.lock().unwrap()[0].clone();
    assert!(ddl.contains("ReplacingMergeTree(`__ver`)"));
    assert!(ddl.contains("`name` Nullable(String)"));
}

#[tokio::test]
async fn test_noop_run_updates_sync_time_without_writes() {
    let source = FakeSource::with_table("orders", 1..=3);
    let dest = FakeDestination::default();
    let state = MemoryStateStore::new();
    let clock = ManualClock::new();
    let orchestrator = Orchestrator::new(vec![orders_mapping()], settings(1000));

    orchestrator.run_pass(&source, &dest, &state, &clock).await;
    let inserts_after_first = dest.insert_calls();

    clock.advance(7200);
    let stats = orchestrator.run_pass(&source, &dest, &state, &clock).await;

    assert_eq!(stats.tables_synced, 1);
    assert_eq!(stats.rows_synced, 0);
    assert_eq!(dest.insert_calls(), inserts_after_first);
    let saved = state.get("orders").unwrap();
    assert_eq!(saved.last_id, CursorValue::Int(3));
    assert_eq!(saved.last_sync_time, START + 7200);
}

#[tokio::test]
async fn test_interval_gate_skips_recent_tables() {
    let source = FakeSource::with_table("orders", 1..=3);
    let dest = FakeDestination::default();
    let state = MemoryStateStore::new();
    let clock = ManualClock::new();
    let orchestrator = Orchestrator::new(vec![orders_mapping()], settings(1000));

    orchestrator.run_pass(&source, &dest, &state, &clock).await;
    source.add_rows("orders", [4]);
    clock.advance(60);
    let stats = orchestrator.run_pass(&source, &dest, &state, &clock).await;

    assert_eq!(stats.tables_skipped, 1);
    assert_eq!(stats.tables_synced, 0);
    assert_eq!(dest.ids("orders_ch"), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_resume_after_push_failure_at_batch_boundary() {
    let source = FakeSource::with_table("orders", 1..=5);
    let dest = FakeDestination::default();
    let state = MemoryStateStore::new();
    let clock = ManualClock::new();
    let orchestrator = Orchestrator::new(vec![orders_mapping()], settings(2));

    dest.fail_insert(2);
    let stats = orchestrator.run_pass(&source, &dest, &state, &clock).await;
    assert_eq!(stats.errors.len(), 1);
    assert!(stats.errors[0].contains("orders"));
    assert_eq!(dest.ids("orders_ch"), vec![1, 2]);
    assert_eq!(state.get("orders").unwrap().last_id, CursorValue::Int(2));

    dest.clear_failures();
    clock.advance(3600);
    let stats = orchestrator.run_pass(&source, &dest, &state, &clock).await;
    assert!(stats.is_success());
    assert_eq!(dest.ids("orders_ch"), vec![1, 2, 3, 4, 5]);
    assert_eq!(state.get("orders").unwrap().last_id, CursorValue::Int(5));
}

#[tokio::test]
async fn test_duplicate_ids_are_rejected() {
    let source = FakeSource::with_table("orders", [1, 2, 2, 3]);
    let dest = FakeDestination::default();
    let state = MemoryStateStore::new();
    let clock = ManualClock::new();
    let settings = settings(1000);
    let ctx = SyncContext::new(&source, &dest, &state, &clock, &settings);
    let plan = TablePlan::new(orders_mapping());

    let err = IncrementalSyncer::new(&ctx).run(&plan).await.unwrap_err();
    assert!(matches!(err, SyncError::NonMonotonicCursor { .. }), "{}", err);
    assert!(dest.rows("orders_ch").is_empty());
    assert_eq!(state.get("orders").unwrap().last_id, CursorValue::Int(0));
}

#[tokio::test]
async fn test_missing_state_is_derived_from_destination() {
    let source = FakeSource::with_table("orders", 1..=12);
    let dest = FakeDestination::with_rows("orders_ch", &["id", "name", "updated_at"], 1..=10);
    let state = MemoryStateStore::new();
    let clock = ManualClock::new();
    let settings = settings(1000);
    let ctx = SyncContext::new(&source, &dest, &state, &clock, &settings);
    let plan = TablePlan::new(orders_mapping());

    let report = IncrementalSyncer::new(&ctx).run(&plan).await.unwrap();
    assert_eq!(report.rows_synced, 2);
    assert_eq!(report.last_id, CursorValue::Int(12));
    assert_eq!(dest.ddl_count(), 0);
    assert_eq!(dest.ids("orders_ch"), (1..=12).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_full_sync_pages_through_table() {
    let source = FakeSource::with_table("orders", 1..=2500);
    let dest = FakeDestination::default();
    let state = MemoryStateStore::new();
    let clock = ManualClock::new();
    let mut mapping = orders_mapping();
    mapping.sync_type = SyncMode::Full;
    let orchestrator = Orchestrator::new(vec![mapping], settings(1000));

    let stats = orchestrator.run_pass(&source, &dest, &state, &clock).await;
    assert!(stats.is_success());
    assert_eq!(stats.rows_synced, 2500);
    assert_eq!(source.fetches(), 3);
    assert_eq!(dest.insert_calls(), 3);
    assert_eq!(dest.rows("orders_ch").len(), 2500);
    assert_eq!(state.get("orders").unwrap().last_id, CursorValue::Int(2500));
}

#[tokio::test]
async fn test_full_sync_reports_failure() {
    let source = FakeSource::with_table("orders", 1..=10);
    let dest = FakeDestination::default();
    let state = MemoryStateStore::new();
    let clock = ManualClock::new();
    let settings = settings(4);
    let ctx = SyncContext::new(&source, &dest, &state, &clock, &settings);
    let plan = TablePlan::new(orders_mapping());

    dest.fail_insert(2);
    assert!(!FullSyncer::new(&ctx).run(&plan).await);
    assert_eq!(dest.rows("orders_ch").len(), 4);
    assert!(state.load("orders").await.unwrap().is_none());
}

#[tokio::test]
async fn test_recency_refresh_repushes_updated_rows() {
    let source = FakeSource::with_table("orders", 1..=3);
    let dest = FakeDestination::default();
    let state = MemoryStateStore::new();
    let clock = ManualClock::new();
    let mut mapping = orders_mapping();
    mapping.update_config = Some(UpdateConfig {
        timestamp_column: "updated_at".to_string(),
        update_interval: 3600,
    });
    let orchestrator = Orchestrator::new(vec![mapping], settings(1000));

    orchestrator.run_pass(&source, &dest, &state, &clock).await;
    let first_version = version_of(&dest.rows("orders_ch")[0]);

    clock.advance(3600);
    source.advance(3600);
    source.add_rows("orders", [4]);
    source.touch("orders", 1);
    source.touch("orders", 4);
    let stats = orchestrator.run_pass(&source, &dest, &state, &clock).await;

    assert!(stats.is_success(), "errors: {:?}", stats.errors);
    assert_eq!(stats.rows_synced, 1);
    assert_eq!(stats.rows_refreshed, 2);

    let copies_of_one: Vec<Record> = dest
        .rows("orders_ch")
        .into_iter()
        .filter(|r| r.get("id") == Some(&Value::Int(1)))
        .collect();
    assert_eq!(copies_of_one.len(), 2);
    let latest = copies_of_one.last().unwrap();
    assert!(version_of(latest) > first_version);
    assert_eq!(latest.get("name"), Some(&Value::from("row-1-updated")));
}

#[tokio::test]
async fn test_failing_table_does_not_block_others() {
    let source = FakeSource::with_table("orders", 1..=3);
    let dest = FakeDestination::default();
    let state = MemoryStateStore::new();
    let clock = ManualClock::new();
    let missing = TableMapping::new("missing", "missing_ch", &["id"], "id");
    let orchestrator = Orchestrator::new(vec![missing, orders_mapping()], settings(1000));

    let stats = orchestrator.run_pass(&source, &dest, &state, &clock).await;

    assert_eq!(stats.errors.len(), 1);
    assert!(stats.errors[0].contains("missing"));
    assert_eq!(stats.tables_synced, 1);
    assert_eq!(dest.ids("orders_ch"), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_decimal_keys_advance_past_nine() {
    let ids = ["9", "10", "10.5", "11"]
        .iter()
        .map(|id| Value::Decimal(id.to_string()))
        .collect();
    let source = KeyedSource::new("decimal", "decimal(10,1)", ids);
    let dest = FakeDestination::default();
    let state = MemoryStateStore::new();
    let clock = ManualClock::new();
    let mapping = TableMapping::new("ledger", "ledger_ch", &["id", "name"], "id");
    let orchestrator = Orchestrator::new(vec![mapping], settings(2));

    let stats = orchestrator.run_pass(&source, &dest, &state, &clock).await;
    assert!(stats.is_success(), "errors: {:?}", stats.errors);
    assert_eq!(stats.rows_synced, 4);
    assert_eq!(
        keyed_ids(&dest, "ledger_ch"),
        vec![
            Value::Decimal("9".to_string()),
            Value::Decimal("10".to_string()),
            Value::Decimal("10.5".to_string()),
            Value::Decimal("11".to_string()),
        ]
    );
    assert_eq!(state.get("ledger").unwrap().last_id, CursorValue::Int(11));
}

#[tokio::test]
async fn test_text_keys_sync_from_the_start() {
    let ids = ["alpha", "bravo", "charlie"]
        .iter()
        .map(|id| Value::from(*id))
        .collect();
    let source = KeyedSource::new("varchar", "varchar(36)", ids);
    let dest = FakeDestination::default();
    let state = MemoryStateStore::new();
    let clock = ManualClock::new();
    let mapping = TableMapping::new("tags", "tags_ch", &["id", "name"], "id");
    let orchestrator = Orchestrator::new(vec![mapping], settings(2));

    let stats = orchestrator.run_pass(&source, &dest, &state, &clock).await;
    assert!(stats.is_success(), "errors: {:?}", stats.errors);
    assert_eq!(stats.rows_synced, 3);
    assert_eq!(keyed_ids(&dest, "tags_ch").len(), 3);
    assert_eq!(
        state.get("tags").unwrap().last_id,
        CursorValue::Text("charlie".to_string())
    );

    clock.advance(3600);
    let stats = orchestrator.run_pass(&source, &dest, &state, &clock).await;
    assert_eq!(stats.rows_synced, 0);
    assert_eq!(keyed_ids(&dest, "tags_ch").len(), 3);
}

#[tokio::test]
async fn test_failed_recency_push_keeps_table_synced() {
    let source = FakeSource::with_table("orders", 1..=3);
    let dest = FakeDestination::default();
    let state = MemoryStateStore::new();
    let clock = ManualClock::new();
    let mut mapping = orders_mapping();
    mapping.update_config = Some(UpdateConfig {
        timestamp_column: "updated_at".to_string(),
        update_interval: 3600,
    });
    let orchestrator = Orchestrator::new(vec![mapping], settings(1000));

    source.touch("orders", 1);
    // Insert 1 is the new batch, insert 2 the recency re-push.
    dest.fail_insert(2);
    let stats = orchestrator.run_pass(&source, &dest, &state, &clock).await;

    assert!(stats.is_success(), "errors: {:?}", stats.errors);
    assert_eq!(stats.tables_synced, 1);
    assert_eq!(stats.rows_refreshed, 0);
    assert_eq!(dest.insert_calls(), 2);
    assert_eq!(dest.ids("orders_ch"), vec![1, 2, 3]);
    assert_eq!(state.get("orders").unwrap().last_id, CursorValue::Int(3));
}
