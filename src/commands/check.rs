// ABOUTME: Connectivity check for the configured MySQL and ClickHouse servers
// ABOUTME: Reports each store separately and fails if either is unreachable

use anyhow::Result;

use crate::clickhouse::ClickHouseClient;
use crate::config::Config;
use crate::mysql::MySqlSource;
use crate::sync::DestinationStore;
use crate::utils::sanitize_url;

pub async fn check(config: &Config) -> Result<()> {
    let mut failures = Vec::new();

    let mysql_target = format!(
        "{}:{}/{}",
        config.mysql.host, config.mysql.port, config.mysql.database
    );
    match MySqlSource::connect(&config.mysql).await {
        Ok(source) => {
            if let Err(e) = source.disconnect().await {
                tracing::warn!("Failed to close MySQL pool: {}", e);
            }
            println!("✓ MySQL connection OK ({})", mysql_target);
        }
        Err(e) => failures.push(format!("MySQL ({}): {}", mysql_target, e)),
    }

    let clickhouse_target = sanitize_url(&config.clickhouse.url);
    match ClickHouseClient::new(&config.clickhouse) {
        Ok(client) => match client.ping().await {
            Ok(()) => println!("✓ ClickHouse connection OK ({})", clickhouse_target),
            Err(e) => failures.push(format!("ClickHouse ({}): {}", clickhouse_target, e)),
        },
        Err(e) => failures.push(format!("ClickHouse ({}): {}", clickhouse_target, e)),
    }

    for failure in &failures {
        println!("✗ {}", failure);
    }

    if !failures.is_empty() {
        anyhow::bail!("{} connection check(s) failed", failures.len());
    }
    Ok(())
}
