// ABOUTME: TOML configuration for the sync daemon: store parameters and table mappings
// ABOUTME: Loaded and validated once at startup; immutable for the process lifetime

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::sync::typemap::TypeMap;
use crate::sync::VERSION_COLUMN;
use crate::utils::{validate_identifier, validate_table_name};

/// Default number of rows fetched and pushed per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Rows per fetch/push batch, shared by all tables
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Seconds the daemon sleeps between passes
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Location of the persisted sync state document
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    pub mysql: MySqlConfig,
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,
    /// Entries merged over the built-in default type table
    #[serde(default)]
    pub type_mapping: BTreeMap<String, String>,
    pub tables: Vec<TableMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MySqlConfig {
    #[serde(default = "default_mysql_host")]
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    #[serde(default = "default_clickhouse_url")]
    pub url: String,
    #[serde(default = "default_clickhouse_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_clickhouse_database")]
    pub database: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_clickhouse_url(),
            user: default_clickhouse_user(),
            password: String::new(),
            database: default_clickhouse_database(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// How a table is replicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Cursor-based append replication plus the optional recency refresh
    #[default]
    Incremental,
    /// Paginated copy of the whole table on every sync
    Full,
}

/// Re-sync window for rows updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Source column holding the row's last modification time
    pub timestamp_column: String,
    /// Lookback window in seconds
    pub update_interval: u64,
}

/// One replicated table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    pub source_table: String,
    pub clickhouse_table: String,
    /// Replicated columns, in destination order
    pub columns: Vec<String>,
    /// Monotonic key used as the incremental cursor
    pub id_column: String,
    /// Per-column destination type overrides, used verbatim
    #[serde(default)]
    pub type_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub order_by: Option<Vec<String>>,
    #[serde(default)]
    pub partition_by: Option<String>,
    #[serde(default = "default_sync_interval")]
    pub sync_interval: u64,
    #[serde(default)]
    pub sync_type: SyncMode,
    #[serde(default)]
    pub update_config: Option<UpdateConfig>,
}

impl TableMapping {
    /// Minimal incremental mapping; the remaining fields keep their defaults.
    pub fn new(source_table: &str, clickhouse_table: &str, columns: &[&str], id_column: &str) -> Self {
        Self {
            source_table: source_table.to_string(),
            clickhouse_table: clickhouse_table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            id_column: id_column.to_string(),
            type_mapping: BTreeMap::new(),
            order_by: None,
            partition_by: None,
            sync_interval: default_sync_interval(),
            sync_type: SyncMode::Incremental,
            update_config: None,
        }
    }

    /// Ordering key of the destination table; falls back to the id column.
    pub fn order_by_columns(&self) -> Vec<String> {
        match &self.order_by {
            Some(cols) if !cols.is_empty() => cols.clone(),
            _ => vec![self.id_column.clone()],
        }
    }

    fn validate(&self) -> Result<()> {
        validate_table_name(&self.source_table).context("Invalid source_table")?;
        validate_table_name(&self.clickhouse_table).with_context(|| {
            format!("Invalid clickhouse_table for {}", self.source_table)
        })?;

        if self.columns.is_empty() {
            bail!("Table {} has no columns configured", self.source_table);
        }

        let mut seen = std::collections::HashSet::new();
        for column in &self.columns {
            validate_identifier(column)
                .with_context(|| format!("Invalid column in {}", self.source_table))?;
            if column == VERSION_COLUMN {
                bail!(
                    "Table {}: column name '{}' is reserved for the version marker",
                    self.source_table,
                    VERSION_COLUMN
                );
            }
            if !seen.insert(column.as_str()) {
                bail!("Table {}: column '{}' listed twice", self.source_table, column);
            }
        }

        if !self.columns.contains(&self.id_column) {
            bail!(
                "Table {}: id_column '{}' must be one of the replicated columns",
                self.source_table,
                self.id_column
            );
        }

        for column in self.order_by.iter().flatten() {
            validate_identifier(column)
                .with_context(|| format!("Invalid order_by entry in {}", self.source_table))?;
        }

        for column in self.type_mapping.keys() {
            if !self.columns.contains(column) {
                bail!(
                    "Table {}: type_mapping names unknown column '{}'",
                    self.source_table,
                    column
                );
            }
        }

        if let Some(update) = &self.update_config {
            validate_identifier(&update.timestamp_column)
                .with_context(|| format!("Invalid timestamp_column in {}", self.source_table))?;
        }

        Ok(())
    }
}

impl Config {
    /// Load, apply environment overrides and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let mut config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to load config file {:?}", path))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var("MYSQL_PASSWORD") {
            self.mysql.password = password;
        }
        if let Ok(password) = std::env::var("CLICKHOUSE_PASSWORD") {
            self.clickhouse.password = password;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be greater than zero");
        }
        if self.tables.is_empty() {
            bail!("No tables configured");
        }
        if self.mysql.database.trim().is_empty() {
            bail!("mysql.database must not be empty");
        }

        let mut names = std::collections::HashSet::new();
        for table in &self.tables {
            table.validate()?;
            if !names.insert(table.source_table.as_str()) {
                bail!("Table {} is configured twice", table.source_table);
            }
        }
        Ok(())
    }

    /// Built-in type defaults with the file's `[type_mapping]` merged on top.
    pub fn type_defaults(&self) -> TypeMap {
        let mut map = TypeMap::default();
        map.extend(
            self.type_mapping
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        map
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_poll_interval() -> u64 {
    60
}

fn default_state_path() -> PathBuf {
    PathBuf::from(".mysql-clickhouse-sync/state.json")
}

fn default_mysql_host() -> String {
    "localhost".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_clickhouse_user() -> String {
    "default".to_string()
}

fn default_clickhouse_database() -> String {
    "default".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_sync_interval() -> u64 {
    3600
}
