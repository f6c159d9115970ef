// ABOUTME: Capability traits the engine needs from the source and destination stores
// ABOUTME: MySQL and ClickHouse implement these; tests substitute in-memory fakes

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::record::{CursorValue, Record};
use crate::error::{DestinationError, SourceError};

/// Catalog entry for one source column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceColumnType {
    /// Base type name, lower case (`DATA_TYPE`, e.g. `decimal`)
    pub data_type: String,
    /// Full type string, lower case (`COLUMN_TYPE`, e.g. `decimal(10,2)`)
    pub column_type: String,
}

impl SourceColumnType {
    pub fn new(data_type: &str, column_type: &str) -> Self {
        Self {
            data_type: data_type.to_lowercase(),
            column_type: column_type.to_lowercase(),
        }
    }
}

/// Read access to the row-oriented source.
///
/// Every method returns records aligned to the `columns` slice it was given.
/// Identifiers come from validated configuration; cursor values and limits are
/// always bound as parameters by implementations.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Cheap round trip used by connectivity checks.
    async fn ping(&self) -> Result<(), SourceError>;

    /// Catalog types of the requested columns. Columns absent from the
    /// catalog are simply missing from the map.
    async fn column_types(
        &self,
        table: &str,
        columns: &[String],
    ) -> Result<HashMap<String, SourceColumnType>, SourceError>;

    /// Maximum of the identifying column, `None` for an empty table.
    async fn max_id(&self, table: &str, id_column: &str) -> Result<Option<CursorValue>, SourceError>;

    async fn count(&self, table: &str) -> Result<u64, SourceError>;

    /// Up to `limit` rows with `id_column > after`, ascending by `id_column`.
    /// `None` reads from the start of the table.
    async fn fetch_after(
        &self,
        table: &str,
        columns: &Arc<[String]>,
        id_column: &str,
        after: Option<&CursorValue>,
        limit: usize,
    ) -> Result<Vec<Record>, SourceError>;

    /// One page of the whole table ordered by `id_column`.
    async fn fetch_page(
        &self,
        table: &str,
        columns: &Arc<[String]>,
        id_column: &str,
        limit: usize,
        offset: u64,
    ) -> Result<Vec<Record>, SourceError>;

    /// Rows whose `timestamp_column` lies within the last `window_secs`
    /// seconds (by the source's clock) and whose `id_column <= max_cursor`.
    async fn fetch_recent(
        &self,
        table: &str,
        columns: &Arc<[String]>,
        id_column: &str,
        timestamp_column: &str,
        window_secs: u64,
        max_cursor: &CursorValue,
    ) -> Result<Vec<Record>, SourceError>;
}

/// Write access to the column-oriented destination.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    async fn ping(&self) -> Result<(), DestinationError>;

    /// Run a DDL/DML statement that returns no rows.
    async fn execute(&self, sql: &str) -> Result<(), DestinationError>;

    /// `Ok(false)` only when the destination reports the table as missing;
    /// every other failure is an error.
    async fn table_exists(&self, table: &str) -> Result<bool, DestinationError>;

    /// Maximum value of `column`, `None` when the table is empty.
    async fn max_value(&self, table: &str, column: &str) -> Result<Option<CursorValue>, DestinationError>;

    /// Bulk insert. Every record must be keyed by exactly `columns`, in order.
    async fn insert(
        &self,
        table: &str,
        columns: &[String],
        records: &[Record],
    ) -> Result<(), DestinationError>;
}
