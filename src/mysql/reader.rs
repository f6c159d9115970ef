// ABOUTME: MySqlSource - reads column metadata and row batches from MySQL
// ABOUTME: Converts mysql_async values into the engine's Value using column metadata

use async_trait::async_trait;
use chrono::NaiveDate;
use mysql_async::consts::ColumnType;
use mysql_async::prelude::*;
use mysql_async::{Column, OptsBuilder, Params, Pool, Row};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::MySqlConfig;
use crate::error::SourceError;
use crate::sync::{CursorValue, Record, SourceColumnType, SourceStore, Value};
use crate::utils::{quote_columns, quote_ident, quote_table};

/// MySQL character set id of binary strings.
const BINARY_CHARSET: u16 = 63;

/// Reads rows from a MySQL database.
///
/// Holds a connection pool for the duration of one pass; call
/// [`MySqlSource::disconnect`] when the pass ends.
pub struct MySqlSource {
    pool: Pool,
    database: String,
}

impl MySqlSource {
    /// Build a pool for `config` and verify it with a ping.
    pub async fn connect(config: &MySqlConfig) -> Result<Self, SourceError> {
        let opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .db_name(Some(config.database.clone()));

        tracing::debug!(
            "Connecting to MySQL at {}:{}/{}",
            config.host,
            config.port,
            config.database
        );

        let source = Self {
            pool: Pool::new(opts),
            database: config.database.clone(),
        };
        source.ping().await?;
        Ok(source)
    }

    /// Release every pooled connection.
    pub async fn disconnect(self) -> Result<(), SourceError> {
        self.pool.disconnect().await?;
        Ok(())
    }

    /// Split `db.table` into schema and table, defaulting to the configured database.
    fn schema_and_table<'t>(&'t self, table: &'t str) -> (&'t str, &'t str) {
        match table.split_once('.') {
            Some((schema, name)) => (schema, name),
            None => (self.database.as_str(), table),
        }
    }

    async fn query_records(
        &self,
        query: String,
        params: Params,
        columns: &Arc<[String]>,
    ) -> Result<Vec<Record>, SourceError> {
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<Row> = conn.exec(query, params).await?;
        rows.into_iter()
            .map(|row| row_to_record(row, columns))
            .collect()
    }
}

#[async_trait]
impl SourceStore for MySqlSource {
    async fn ping(&self) -> Result<(), SourceError> {
        let mut conn = self.pool.get_conn().await?;
        conn.ping().await?;
        Ok(())
    }

    async fn column_types(
        &self,
        table: &str,
        columns: &[String],
    ) -> Result<HashMap<String, SourceColumnType>, SourceError> {
        let (schema, name) = self.schema_and_table(table);
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<(String, String, String)> = conn
            .exec(
                "SELECT COLUMN_NAME, DATA_TYPE, COLUMN_TYPE \
                 FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_NAME = ? AND TABLE_SCHEMA = ?",
                (name, schema),
            )
            .await?;

        Ok(rows
            .into_iter()
            .filter(|(column, _, _)| columns.contains(column))
            .map(|(column, data_type, column_type)| {
                (column, SourceColumnType::new(&data_type, &column_type))
            })
            .collect())
    }

    async fn max_id(&self, table: &str, id_column: &str) -> Result<Option<CursorValue>, SourceError> {
        let mut conn = self.pool.get_conn().await?;
        let row: Option<Row> = conn.exec_first(build_max_query(table, id_column), ()).await?;
        Ok(row.and_then(first_cursor))
    }

    async fn count(&self, table: &str) -> Result<u64, SourceError> {
        let mut conn = self.pool.get_conn().await?;
        let count: Option<u64> = conn
            .exec_first(format!("SELECT COUNT(*) FROM {}", quote_table(table)), ())
            .await?;
        Ok(count.unwrap_or(0))
    }

    async fn fetch_after(
        &self,
        table: &str,
        columns: &Arc<[String]>,
        id_column: &str,
        after: Option<&CursorValue>,
        limit: usize,
    ) -> Result<Vec<Record>, SourceError> {
        let mut params: Vec<mysql_async::Value> = after.map(cursor_param).into_iter().collect();
        params.push((limit as u64).into());
        self.query_records(
            build_fetch_after_query(table, columns, id_column, after.is_some()),
            Params::Positional(params),
            columns,
        )
        .await
    }

    async fn fetch_page(
        &self,
        table: &str,
        columns: &Arc<[String]>,
        id_column: &str,
        limit: usize,
        offset: u64,
    ) -> Result<Vec<Record>, SourceError> {
        let params = Params::Positional(vec![(limit as u64).into(), offset.into()]);
        self.query_records(build_page_query(table, columns, id_column), params, columns)
            .await
    }

    async fn fetch_recent(
        &self,
        table: &str,
        columns: &Arc<[String]>,
        id_column: &str,
        timestamp_column: &str,
        window_secs: u64,
        max_cursor: &CursorValue,
    ) -> Result<Vec<Record>, SourceError> {
        let params = Params::Positional(vec![window_secs.into(), cursor_param(max_cursor)]);
        self.query_records(
            build_recent_query(table, columns, id_column, timestamp_column),
            params,
            columns,
        )
        .await
    }
}

fn build_max_query(table: &str, id_column: &str) -> String {
    format!(
        "SELECT MAX({}) FROM {}",
        quote_ident(id_column),
        quote_table(table)
    )
}

fn build_fetch_after_query(
    table: &str,
    columns: &[String],
    id_column: &str,
    bounded: bool,
) -> String {
    let id = quote_ident(id_column);
    let filter = if bounded {
        format!(" WHERE {} > ?", id)
    } else {
        String::new()
    };
    format!(
        "SELECT {} FROM {}{} ORDER BY {} ASC LIMIT ?",
        quote_columns(columns),
        quote_table(table),
        filter,
        id
    )
}

fn build_page_query(table: &str, columns: &[String], id_column: &str) -> String {
    format!(
        "SELECT {} FROM {} ORDER BY {} LIMIT ? OFFSET ?",
        quote_columns(columns),
        quote_table(table),
        quote_ident(id_column)
    )
}

fn build_recent_query(
    table: &str,
    columns: &[String],
    id_column: &str,
    timestamp_column: &str,
) -> String {
    let id = quote_ident(id_column);
    format!(
        "SELECT {} FROM {} WHERE {} > DATE_SUB(NOW(), INTERVAL ? SECOND) AND {} <= ? ORDER BY {}",
        quote_columns(columns),
        quote_table(table),
        quote_ident(timestamp_column),
        id,
        id
    )
}

fn cursor_param(cursor: &CursorValue) -> mysql_async::Value {
    match cursor {
        CursorValue::Int(v) => mysql_async::Value::Int(*v),
        CursorValue::Numeric(s) => match s.parse::<u64>() {
            Ok(v) => mysql_async::Value::UInt(v),
            Err(_) => mysql_async::Value::Bytes(s.as_bytes().to_vec()),
        },
        CursorValue::Text(s) => mysql_async::Value::Bytes(s.as_bytes().to_vec()),
    }
}

fn first_cursor(row: Row) -> Option<CursorValue> {
    let columns = row.columns();
    let column = columns.first()?;
    let value = row.unwrap_raw().into_iter().next()??;
    CursorValue::from_value(&decode_value(value, column))
}

fn row_to_record(row: Row, columns: &Arc<[String]>) -> Result<Record, SourceError> {
    let meta = row.columns();
    let values: Vec<Value> = row
        .unwrap_raw()
        .into_iter()
        .zip(meta.iter())
        .map(|(value, column)| decode_value(value.unwrap_or(mysql_async::Value::NULL), column))
        .collect();
    let got = values.len();
    Record::new(Arc::clone(columns), values).ok_or_else(|| {
        SourceError::Decode(format!(
            "expected {} columns, row has {}",
            columns.len(),
            got
        ))
    })
}

/// Convert one MySQL value, using the column metadata to tell decimals,
/// binary strings and dates apart.
pub fn decode_value(value: mysql_async::Value, column: &Column) -> Value {
    use mysql_async::Value as My;

    let column_type = column.column_type();
    match value {
        My::NULL => Value::Null,
        My::Int(v) => Value::Int(v),
        My::UInt(v) => Value::UInt(v),
        My::Float(v) => Value::Float(v as f64),
        My::Double(v) => Value::Float(v),
        My::Date(year, month, day, hour, minute, second, micros) => {
            // Zero dates ('0000-00-00') have no calendar equivalent.
            let Some(date) = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32) else {
                return Value::Null;
            };
            if column_type == ColumnType::MYSQL_TYPE_DATE {
                Value::Date(date)
            } else {
                date.and_hms_micro_opt(hour as u32, minute as u32, second as u32, micros)
                    .map(Value::DateTime)
                    .unwrap_or(Value::Null)
            }
        }
        My::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = days * 24 + hours as u32;
            let mut text = format!(
                "{}{:02}:{:02}:{:02}",
                if negative { "-" } else { "" },
                total_hours,
                minutes,
                seconds
            );
            if micros > 0 {
                text.push_str(&format!(".{:06}", micros));
            }
            Value::Text(text)
        }
        My::Bytes(bytes) => match column_type {
            ColumnType::MYSQL_TYPE_NEWDECIMAL | ColumnType::MYSQL_TYPE_DECIMAL => {
                Value::Decimal(String::from_utf8_lossy(&bytes).into_owned())
            }
            _ if column.character_set() == BINARY_CHARSET && is_string_type(column_type) => {
                Value::Bytes(bytes)
            }
            _ => Value::Text(String::from_utf8_lossy(&bytes).into_owned()),
        },
    }
}

fn is_string_type(column_type: ColumnType) -> bool {
    matches!(
        column_type,
        ColumnType::MYSQL_TYPE_BLOB
            | ColumnType::MYSQL_TYPE_TINY_BLOB
            | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
            | ColumnType::MYSQL_TYPE_LONG_BLOB
            | ColumnType::MYSQL_TYPE_STRING
            | ColumnType::MYSQL_TYPE_VAR_STRING
            | ColumnType::MYSQL_TYPE_VARCHAR
    )
}
