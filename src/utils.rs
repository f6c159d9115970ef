// ABOUTME: Identifier validation and quoting for MySQL and ClickHouse statements
// ABOUTME: Also hosts URL sanitising and retry helpers shared by the store accessors

use anyhow::{bail, Result};
use std::time::Duration;

/// Validate a plain SQL identifier (table or column name).
///
/// Identifiers are interpolated into statements for both stores, so only
/// letters, digits and underscores are accepted, and the first character must
/// not be a digit. Values are always bound as parameters and never pass
/// through here.
///
/// # Examples
///
/// ```
/// # use mysql_clickhouse_sync::utils::validate_identifier;
/// assert!(validate_identifier("orders").is_ok());
/// assert!(validate_identifier("_private").is_ok());
/// assert!(validate_identifier("9lives").is_err());
/// assert!(validate_identifier("id; DROP TABLE users").is_err());
/// ```
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.trim().is_empty() {
        bail!("Identifier cannot be empty or whitespace-only");
    }

    if identifier.len() > 64 {
        bail!(
            "Identifier '{}' exceeds maximum length of 64 characters (got {})",
            sanitize_identifier(identifier),
            identifier.len()
        );
    }

    let mut chars = identifier.chars();
    if let Some(first) = chars.next() {
        if !first.is_ascii_alphabetic() && first != '_' {
            bail!(
                "Identifier '{}' must start with a letter or underscore, not '{}'",
                sanitize_identifier(identifier),
                first
            );
        }
    }

    for (i, c) in identifier.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' {
            bail!(
                "Identifier '{}' contains invalid character '{}' at position {}. \
                 Only letters, digits, and underscores are allowed",
                sanitize_identifier(identifier),
                if c.is_control() {
                    format!("\\x{:02x}", c as u32)
                } else {
                    c.to_string()
                },
                i
            );
        }
    }

    Ok(())
}

/// Validate a table name, optionally qualified as `database.table`.
pub fn validate_table_name(name: &str) -> Result<()> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        bail!(
            "Table name '{}' may contain at most one '.' qualifier",
            sanitize_identifier(name)
        );
    }
    for part in parts {
        validate_identifier(part)?;
    }
    Ok(())
}

/// Remove control characters and cap length, for log and error output only.
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

/// Quote an identifier with backticks, doubling embedded backticks.
///
/// Both MySQL and ClickHouse accept backtick-quoted identifiers.
///
/// ```
/// use mysql_clickhouse_sync::utils::quote_ident;
/// assert_eq!(quote_ident("users"), "`users`");
/// assert_eq!(quote_ident("user`name"), "`user``name`");
/// ```
pub fn quote_ident(identifier: &str) -> String {
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push('`');
    for ch in identifier.chars() {
        if ch == '`' {
            quoted.push('`');
        }
        quoted.push(ch);
    }
    quoted.push('`');
    quoted
}

/// Quote a possibly qualified table name (`db.table` -> `` `db`.`table` ``).
pub fn quote_table(name: &str) -> String {
    name.split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

/// Join a column list into a quoted, comma separated select list.
pub fn quote_columns(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Mask the password component of a URL so it can be logged.
pub fn sanitize_url(url: &str) -> String {
    if let Ok(mut parsed) = url::Url::parse(url) {
        if parsed.password().is_some() {
            let _ = parsed.set_password(Some("***"));
        }
        parsed.to_string()
    } else {
        url.to_string()
    }
}

/// Retry an async operation with exponential backoff.
///
/// Used when opening connections at the start of a pass; transient network
/// blips should not cost a whole poll interval.
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = initial_delay;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_retries => {
                tracing::warn!(
                    "Operation failed (attempt {}/{}): {}. Retrying in {:?}...",
                    attempt + 1,
                    max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
