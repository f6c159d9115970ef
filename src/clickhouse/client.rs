// ABOUTME: HTTP client for the ClickHouse destination
// ABOUTME: Executes DDL, probes tables, reads max values and bulk-inserts records

use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;

use crate::config::ClickHouseConfig;
use crate::error::DestinationError;
use crate::sync::{CursorValue, DestinationStore, Record};
use crate::utils::{quote_columns, quote_table, sanitize_url};

/// Exception codes meaning "unknown table" and "unknown database".
const NOT_FOUND_CODES: [u32; 2] = [60, 81];

const EXCEPTION_CODE_HEADER: &str = "X-ClickHouse-Exception-Code";

pub struct ClickHouseClient {
    client: Client,
    url: String,
    user: String,
    password: String,
    database: String,
}

impl ClickHouseClient {
    pub fn new(config: &ClickHouseConfig) -> Result<Self, DestinationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
        })
    }

    /// Build a client and verify the server answers.
    pub async fn connect(config: &ClickHouseConfig) -> Result<Self, DestinationError> {
        let client = Self::new(config)?;
        tracing::debug!("Connecting to ClickHouse at {}", sanitize_url(&client.url));
        client.ping().await?;
        Ok(client)
    }

    async fn send(&self, query: &str, body: Option<String>) -> Result<String, DestinationError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.password)
            .query(&[("database", self.database.as_str())]);

        request = match body {
            Some(body) => request
                .query(&[
                    ("query", query),
                    ("date_time_input_format", "best_effort"),
                ])
                .body(body),
            None => request.body(query.to_string()),
        };

        let response = request.send().await?;
        check_response(response).await
    }
}

async fn check_response(response: Response) -> Result<String, DestinationError> {
    let status = response.status();
    let header_code = response
        .headers()
        .get(EXCEPTION_CODE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u32>().ok());
    let body = response.text().await?;

    if status.is_success() && header_code.is_none() {
        return Ok(body);
    }

    let code = header_code.or_else(|| parse_exception_code(&body));
    let message = body.trim().to_string();
    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => Err(DestinationError::NotFound(message)),
        _ => Err(DestinationError::Server { code, message }),
    }
}

/// Extract the numeric code from a ClickHouse exception body (`Code: 60. DB::Exception: ...`).
pub fn parse_exception_code(body: &str) -> Option<u32> {
    let start = body.find("Code: ")? + "Code: ".len();
    let digits: String = body[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn parse_max_value(body: &str) -> Result<Option<CursorValue>, DestinationError> {
    let parsed: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| DestinationError::Decode(format!("invalid JSONCompact response: {}", e)))?;
    let cell = parsed
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|row| row.get(0))
        .ok_or_else(|| DestinationError::Decode("response has no data rows".to_string()))?;
    let column_type = parsed
        .get("meta")
        .and_then(|m| m.get(0))
        .and_then(|c| c.get("type"))
        .and_then(|t| t.as_str())
        .unwrap_or_default();
    let numeric_column = ["Int", "Decimal", "Float"]
        .iter()
        .any(|kind| column_type.contains(kind));

    let text = match cell {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Number(n) => n.to_string(),
        // 64-bit integers are quoted by default in JSON output formats.
        serde_json::Value::String(s) if s.is_empty() => return Ok(None),
        serde_json::Value::String(s) => s.clone(),
        other => {
            return Err(DestinationError::Decode(format!(
                "unexpected max value {}",
                other
            )))
        }
    };

    if numeric_column || cell.is_number() {
        CursorValue::numeric(&text).map(Some).ok_or_else(|| {
            DestinationError::Decode(format!("non-numeric max value {} for {}", text, column_type))
        })
    } else {
        Ok(Some(CursorValue::Text(text)))
    }
}

fn build_insert_body(records: &[Record]) -> String {
    let mut body = String::new();
    for record in records {
        body.push_str(&record.to_json_line());
        body.push('\n');
    }
    body
}

#[async_trait]
impl DestinationStore for ClickHouseClient {
    async fn ping(&self) -> Result<(), DestinationError> {
        self.send("SELECT 1", None).await.map(|_| ())
    }

    async fn execute(&self, sql: &str) -> Result<(), DestinationError> {
        self.send(sql, None).await.map(|_| ())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, DestinationError> {
        match self.send(&format!("DESCRIBE TABLE {}", quote_table(table)), None).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn max_value(&self, table: &str, column: &str) -> Result<Option<CursorValue>, DestinationError> {
        // Empty tables yield the type default for max(), so count rows alongside it.
        let query = format!(
            "SELECT if(count() = 0, NULL, max({col})) FROM {table} FORMAT JSONCompact",
            col = crate::utils::quote_ident(column),
            table = quote_table(table)
        );
        let body = self.send(&query, None).await?;
        parse_max_value(&body)
    }

    async fn insert(
        &self,
        table: &str,
        columns: &[String],
        records: &[Record],
    ) -> Result<(), DestinationError> {
        if records.is_empty() {
            return Ok(());
        }
        let query = format!(
            "INSERT INTO {} ({}) FORMAT JSONEachRow",
            quote_table(table),
            quote_columns(columns)
        );
        tracing::debug!("Inserting {} rows into {}", records.len(), table);
        self.send(&query, Some(build_insert_body(records)))
            .await
            .map(|_| ())
    }
}
