//! Statement builders over the template library.
//!
//! Identifiers are validated and double-quoted; string literals are escaped by
//! doubling single quotes. Nothing here touches the warehouse.

use crate::config::Secret;
use crate::error::TaskError;

/// Storage access keys embedded in a COPY statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageCredentials {
    pub access_key_id: Secret,
    pub secret_access_key: Secret,
}

fn is_plain_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate and quote a possibly schema-qualified identifier.
///
/// `public.time` becomes `"public"."time"`.
pub fn quote_identifier(identifier: &str) -> Result<String, TaskError> {
    let parts: Vec<&str> = identifier.split('.').collect();
    if parts.len() > 2 || !parts.iter().all(|p| is_plain_identifier(p)) {
        return Err(TaskError::invalid_parameter(
            "identifier",
            format!("'{identifier}' is not a valid table or column name"),
        ));
    }

    Ok(parts
        .iter()
        .map(|p| format!("\"{p}\""))
        .collect::<Vec<_>>()
        .join("."))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Generic insert wrapper: `INSERT INTO {table} {select}`
pub fn render_insert(table: &str, select: &str) -> Result<String, TaskError> {
    Ok(format!("INSERT INTO {} {}", quote_identifier(table)?, select))
}

/// Insert only the rows whose key tuple is not already in `table`.
///
/// The SELECT must alias its output columns with the target column names.
pub fn render_insert_deduplicated(
    table: &str,
    key_columns: &[String],
    select: &str,
) -> Result<String, TaskError> {
    if key_columns.is_empty() {
        return Err(TaskError::invalid_parameter(
            "dedup_keys",
            "at least one key column is required",
        ));
    }

    let target = quote_identifier(table)?;
    let predicate = key_columns
        .iter()
        .map(|column| {
            let column = quote_identifier(column)?;
            Ok(format!("dst.{column} = src.{column}"))
        })
        .collect::<Result<Vec<_>, TaskError>>()?
        .join(" AND ");

    Ok(format!(
        "INSERT INTO {target} SELECT src.* FROM ({select}) AS src \
         WHERE NOT EXISTS (SELECT 1 FROM {target} AS dst WHERE {predicate})"
    ))
}

/// Bulk-load newline-delimited JSON from object storage
pub fn render_copy_json(
    table: &str,
    source_uri: &str,
    credentials: &StorageCredentials,
    region: &str,
    json_format: &str,
) -> Result<String, TaskError> {
    Ok(format!(
        "COPY {} FROM {} ACCESS_KEY_ID {} SECRET_ACCESS_KEY {} REGION {} FORMAT AS JSON {}",
        quote_identifier(table)?,
        quote_literal(source_uri),
        quote_literal(credentials.access_key_id.expose()),
        quote_literal(credentials.secret_access_key.expose()),
        quote_literal(region),
        quote_literal(json_format),
    ))
}

pub fn render_truncate(table: &str) -> Result<String, TaskError> {
    Ok(format!("TRUNCATE TABLE {}", quote_identifier(table)?))
}

pub fn render_row_count(table: &str) -> Result<String, TaskError> {
    Ok(format!("SELECT COUNT(*) FROM {}", quote_identifier(table)?))
}

pub fn render_null_count(table: &str, column: &str) -> Result<String, TaskError> {
    Ok(format!(
        "SELECT COUNT(*) FROM {} WHERE {} IS NULL",
        quote_identifier(table)?,
        quote_identifier(column)?
    ))
}

/// Replace credential values in a statement before it is logged
pub fn redact(statement: &str, credentials: &StorageCredentials) -> String {
    let mut redacted = statement.to_string();
    for secret in [&credentials.access_key_id, &credentials.secret_access_key] {
        if !secret.expose().is_empty() {
            redacted = redacted.replace(
                &quote_literal(secret.expose()),
                &quote_literal(Secret::REDACTED),
            );
        }
    }
    redacted
}
