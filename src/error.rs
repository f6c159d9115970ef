// ABOUTME: Error taxonomy for the sync engine and its store accessors
// ABOUTME: Each component boundary returns one of these instead of a bare anyhow::Error

use thiserror::Error;

use crate::sync::CursorValue;

/// Errors raised by the source (MySQL) accessor.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source connection failed: {0}")]
    Connection(String),
    #[error("source query failed: {0}")]
    Query(String),
    #[error("failed to decode source value: {0}")]
    Decode(String),
}

impl From<mysql_async::Error> for SourceError {
    fn from(err: mysql_async::Error) -> Self {
        match err {
            mysql_async::Error::Driver(e) => SourceError::Connection(e.to_string()),
            mysql_async::Error::Io(e) => SourceError::Connection(e.to_string()),
            other => SourceError::Query(other.to_string()),
        }
    }
}

/// Errors raised by the destination (ClickHouse) accessor.
#[derive(Debug, Error)]
pub enum DestinationError {
    /// The referenced table or database does not exist.
    #[error("destination object does not exist: {0}")]
    NotFound(String),
    #[error("destination rejected request (code {code:?}): {message}")]
    Server { code: Option<u32>, message: String },
    #[error("destination transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode destination response: {0}")]
    Decode(String),
}

impl DestinationError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DestinationError::NotFound(_))
    }
}

/// Errors raised by a persisted state backend.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state record is malformed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("failed to persist state file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Per-table sync failures. None of these abort a pass; the orchestrator logs
/// them and moves on to the next table.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to read column metadata for {table}: {source}")]
    Metadata {
        table: String,
        #[source]
        source: SourceError,
    },
    #[error("column {column} of {table} is missing from the source catalog")]
    MissingColumn { table: String, column: String },
    #[error("failed to provision destination table {table}: {source}")]
    Provision {
        table: String,
        #[source]
        source: DestinationError,
    },
    #[error("failed to read {table} from source: {source}")]
    Read {
        table: String,
        #[source]
        source: SourceError,
    },
    #[error("failed to push batch into {table}: {source}")]
    Push {
        table: String,
        #[source]
        source: DestinationError,
    },
    #[error("identifying column {column} of {table} is not strictly increasing ({previous} followed by {next})")]
    NonMonotonicCursor {
        table: String,
        column: String,
        previous: CursorValue,
        next: CursorValue,
    },
    #[error("row of {table} has no usable value in identifying column {column}")]
    MissingCursor { table: String, column: String },
}

impl SyncError {
    /// Short label of the failed operation, used in log lines.
    pub fn operation(&self) -> &'static str {
        match self {
            SyncError::Metadata { .. } | SyncError::MissingColumn { .. } => "metadata",
            SyncError::Provision { .. } => "provision",
            SyncError::Read { .. } => "read",
            SyncError::Push { .. } => "push",
            SyncError::NonMonotonicCursor { .. } | SyncError::MissingCursor { .. } => "cursor",
        }
    }
}
