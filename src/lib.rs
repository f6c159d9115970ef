// ABOUTME: Library root for mysql-clickhouse-sync
// ABOUTME: Exposes the sync engine, the MySQL/ClickHouse accessors and CLI commands

pub mod clickhouse;
pub mod commands;
pub mod config;
pub mod error;
pub mod mysql;
pub mod sync;
pub mod utils;

pub use config::{Config, SyncMode, TableMapping, UpdateConfig};
pub use error::{DestinationError, SourceError, StateError, SyncError};
pub use sync::{Orchestrator, PassStats};
