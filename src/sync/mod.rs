// ABOUTME: MySQL -> ClickHouse synchronization engine
// ABOUTME: Schema provisioning, cursor-based incremental sync, recency refresh and full refresh

pub mod clock;
pub mod full;
pub mod incremental;
pub mod orchestrator;
pub mod recency;
pub mod record;
pub mod schema;
pub mod state;
pub mod store;
pub mod typemap;

pub use clock::{Clock, SystemClock};
pub use full::FullSyncer;
pub use incremental::{IncrementalReport, IncrementalSyncer};
pub use orchestrator::{Orchestrator, PassStats};
pub use recency::RecencyRefresher;
pub use record::{CursorValue, Record, Value};
pub use schema::SchemaProvisioner;
pub use state::{FileStateStore, MemoryStateStore, StateStore, StateTracker, SyncState};
pub use store::{DestinationStore, SourceColumnType, SourceStore};
pub use typemap::TypeMap;

use chrono::SubsecRound;
use std::sync::Arc;

use crate::config::TableMapping;

/// Destination-only column carrying the write time of each pushed row.
pub const VERSION_COLUMN: &str = "__ver";

/// ClickHouse type of [`VERSION_COLUMN`].
pub const VERSION_COLUMN_TYPE: &str = "DateTime64(3)";

/// A table mapping together with its derived column lists.
///
/// Built once per mapping; the configured column list is never mutated.
#[derive(Debug, Clone)]
pub struct TablePlan {
    mapping: TableMapping,
    source_columns: Arc<[String]>,
    effective_columns: Arc<[String]>,
}

impl TablePlan {
    pub fn new(mapping: TableMapping) -> Self {
        let source_columns: Arc<[String]> = mapping.columns.clone().into();
        let effective_columns: Arc<[String]> = mapping
            .columns
            .iter()
            .cloned()
            .chain(std::iter::once(VERSION_COLUMN.to_string()))
            .collect::<Vec<_>>()
            .into();
        Self {
            mapping,
            source_columns,
            effective_columns,
        }
    }

    pub fn mapping(&self) -> &TableMapping {
        &self.mapping
    }

    /// Key of this table's sync state record.
    pub fn name(&self) -> &str {
        &self.mapping.source_table
    }

    /// Columns read from the source, in configured order.
    pub fn source_columns(&self) -> &Arc<[String]> {
        &self.source_columns
    }

    /// Columns written to the destination: source columns plus the version marker.
    pub fn effective_columns(&self) -> &Arc<[String]> {
        &self.effective_columns
    }
}

/// Engine-wide settings shared by every table.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub batch_size: usize,
    pub type_defaults: TypeMap,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: crate::config::DEFAULT_BATCH_SIZE,
            type_defaults: TypeMap::default(),
        }
    }
}

/// Borrowed collaborators for one sync pass.
pub struct SyncContext<'a, S: SourceStore, D: DestinationStore, K: StateStore> {
    pub source: &'a S,
    pub destination: &'a D,
    pub state: StateTracker<'a, K>,
    pub clock: &'a dyn Clock,
    pub settings: &'a SyncSettings,
}

impl<'a, S: SourceStore, D: DestinationStore, K: StateStore> SyncContext<'a, S, D, K> {
    pub fn new(
        source: &'a S,
        destination: &'a D,
        state_store: &'a K,
        clock: &'a dyn Clock,
        settings: &'a SyncSettings,
    ) -> Self {
        Self {
            source,
            destination,
            state: StateTracker::new(state_store, clock),
            clock,
            settings,
        }
    }

    /// A fresh version marker taken from the context clock, at the
    /// millisecond precision of [`VERSION_COLUMN_TYPE`].
    pub fn version_marker(&self) -> Value {
        Value::DateTime(self.clock.now().trunc_subsecs(3).naive_utc())
    }
}

/// Stamp every record of a batch with the same version marker.
pub(crate) fn stamp_batch(records: Vec<Record>, plan: &TablePlan, version: &Value) -> Vec<Record> {
    records
        .into_iter()
        .map(|r| r.stamped(plan.effective_columns(), version))
        .collect()
}
