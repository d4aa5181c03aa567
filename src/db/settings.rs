//! Site settings: JSON values keyed by short identifiers.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::repository::now_rfc3339;
use super::Repository;
use crate::errors::AppError;
use crate::models::SiteSetting;

impl Repository {
    pub async fn get_setting(&self, key: &str) -> Result<Option<SiteSetting>, AppError> {
        let row = sqlx::query("SELECT key, value, updated_at FROM site_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(setting_from_row).transpose()
    }

    pub async fn list_settings(&self) -> Result<Vec<SiteSetting>, AppError> {
        let rows = sqlx::query("SELECT key, value, updated_at FROM site_settings ORDER BY key")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(setting_from_row).collect()
    }

    /// Insert or replace a setting.
    pub async fn put_setting(&self, key: &str, value: &serde_json::Value) -> Result<SiteSetting, AppError> {
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO site_settings (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(serde_json::to_string(value)?)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::info!("Setting {} updated", key);
        Ok(SiteSetting {
            key: key.to_string(),
            value: value.clone(),
            updated_at: now,
        })
    }

    pub async fn delete_setting(&self, key: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM site_settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Setting {} not found", key)));
        }
        Ok(())
    }
}

fn setting_from_row(row: &SqliteRow) -> Result<SiteSetting, AppError> {
    let raw: String = row.get("value");
    Ok(SiteSetting {
        key: row.get("key"),
        value: serde_json::from_str(&raw)?,
        updated_at: row.get("updated_at"),
    })
}
