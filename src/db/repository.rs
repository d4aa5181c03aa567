//! Database repository for CRUD operations.
//!
//! Entity operations live in sibling modules as further `impl Repository`
//! blocks; this file holds the handle and the row helpers they share.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for maintenance jobs that need to close it.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Current time as stored in every timestamp column.
pub(super) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub(super) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Decode a JSON string-array column, treating bad data as empty.
pub(super) fn json_list(row: &SqliteRow, column: &str) -> Vec<String> {
    let raw: Option<String> = row.get(column);
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

pub(super) fn to_json_list(items: &[String]) -> Result<String, AppError> {
    Ok(serde_json::to_string(items)?)
}

/// Parse an optional RFC 3339 column.
pub(super) fn parse_timestamp(raw: Option<String>) -> Option<chrono::DateTime<chrono::Utc>> {
    raw.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

/// Whether a sqlx error is a UNIQUE constraint violation.
pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// Trim an optional string and treat empty as absent.
pub(super) fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
