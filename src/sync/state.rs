// ABOUTME: Per-table sync progress: cursor and last attempt time
// ABOUTME: Keyed state backends plus the tracker that loads, derives and saves records

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::clock::Clock;
use super::record::CursorValue;
use super::store::DestinationStore;
use super::TablePlan;
use crate::error::StateError;

/// Persisted progress of one table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncState {
    /// Last identifying-column value known to be in the destination
    pub last_id: CursorValue,
    /// Epoch seconds of the last attempt, including no-op attempts
    pub last_sync_time: i64,
}

impl SyncState {
    pub fn new(last_id: CursorValue, last_sync_time: i64) -> Self {
        Self {
            last_id,
            last_sync_time,
        }
    }

    /// Whether `sync_interval` seconds have elapsed since the last attempt.
    pub fn is_due(&self, now: i64, sync_interval: u64) -> bool {
        now.saturating_sub(self.last_sync_time) >= sync_interval as i64
    }
}

/// A durable keyed store of [`SyncState`] records.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<SyncState>, StateError>;
    async fn save(&self, key: &str, state: &SyncState) -> Result<(), StateError>;
}

/// On-disk document holding every table's record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDocument {
    pub tables: BTreeMap<String, SyncState>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// JSON file backend. Every save rewrites the whole document through a
/// temporary file in the same directory that is flushed and then renamed
/// over the original, so readers see either the old or the new document.
pub struct FileStateStore {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    lock: tokio::sync::Mutex<()>,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document; a missing file is an empty document.
    pub async fn read_document(&self) -> Result<StateDocument, StateError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StateDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, document: &StateDocument) -> Result<(), StateError> {
        let contents = serde_json::to_vec_pretty(document)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &contents))
            .await
            .map_err(|e| StateError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), StateError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, key: &str) -> Result<Option<SyncState>, StateError> {
        let document = self.read_document().await?;
        Ok(document.tables.get(key).cloned())
    }

    async fn save(&self, key: &str, state: &SyncState) -> Result<(), StateError> {
        let _guard = self.lock.lock().await;
        let mut document = match self.read_document().await {
            Ok(document) => document,
            Err(StateError::Serde(e)) => {
                tracing::warn!(
                    "State file {} is unreadable ({}), rewriting it",
                    self.path.display(),
                    e
                );
                StateDocument::default()
            }
            Err(e) => return Err(e),
        };
        document.tables.insert(key.to_string(), state.clone());
        document.updated_at = Some(chrono::Utc::now());
        self.write_document(&document).await
    }
}

/// In-process backend for tests and one-shot dry runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<String, SyncState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one record, bypassing the async interface.
    pub fn get(&self, key: &str) -> Option<SyncState> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: &str, state: SyncState) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), state);
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, key: &str) -> Result<Option<SyncState>, StateError> {
        Ok(self.get(key))
    }

    async fn save(&self, key: &str, state: &SyncState) -> Result<(), StateError> {
        self.insert(key, state.clone());
        Ok(())
    }
}

/// Sync State Store: reads, derives and saves per-table records.
///
/// Failures never propagate: a failed read is treated as "nothing synced yet"
/// and a failed write leaves the previous record in place. Both are logged.
pub struct StateTracker<'a, K: StateStore> {
    store: &'a K,
    clock: &'a dyn Clock,
}

impl<'a, K: StateStore> StateTracker<'a, K> {
    pub fn new(store: &'a K, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Load the persisted record, or the zero state.
    pub async fn load(&self, table: &str) -> SyncState {
        match self.store.load(table).await {
            Ok(Some(state)) => state,
            Ok(None) => SyncState::default(),
            Err(e) => {
                tracing::error!("Error reading sync state for {}: {}", table, e);
                SyncState::default()
            }
        }
    }

    /// Load the persisted record; when none exists, derive the cursor from the
    /// destination's current maximum id, persist it and force an immediate
    /// sync by leaving `last_sync_time` at zero.
    pub async fn load_or_derive<D: DestinationStore>(
        &self,
        table: &str,
        destination: &D,
        plan: &TablePlan,
    ) -> SyncState {
        match self.store.load(table).await {
            Ok(Some(state)) => return state,
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Error reading sync state for {}: {}", table, e);
                return SyncState::default();
            }
        }

        let mapping = plan.mapping();
        let last_id = match destination
            .max_value(&mapping.clickhouse_table, &mapping.id_column)
            .await
        {
            Ok(Some(max_id)) => max_id,
            Ok(None) => CursorValue::zero(),
            Err(e) => {
                tracing::error!(
                    "Error getting max {} from ClickHouse table {}: {}",
                    mapping.id_column,
                    mapping.clickhouse_table,
                    e
                );
                CursorValue::zero()
            }
        };

        let state = SyncState::new(last_id, 0);
        if let Err(e) = self.store.save(table, &state).await {
            tracing::error!("Error saving derived sync state for {}: {}", table, e);
        }
        tracing::info!(
            "Initialized state from ClickHouse for {} with max_id: {}",
            table,
            state.last_id
        );
        state
    }

    /// Record an attempt: `last_id` as given, `last_sync_time` = now.
    pub async fn save(&self, table: &str, last_id: &CursorValue) {
        let state = SyncState::new(last_id.clone(), self.clock.epoch_seconds());
        if let Err(e) = self.store.save(table, &state).await {
            tracing::error!("Error saving sync state for {}: {}", table, e);
        }
    }
}
