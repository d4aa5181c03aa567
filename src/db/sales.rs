//! Sale (offer) queries.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::repository::{new_id, non_empty, now_rfc3339, parse_timestamp};
use super::Repository;
use crate::errors::AppError;
use crate::models::{
    check_version, validate_sale_terms, CreateSaleRequest, DiscountKind, Sale, UpdateSaleRequest,
};
use crate::pricing::sale_is_live;

const SALE_COLUMNS: &str = "id, name, description, code, kind, value, collection_id, starts_at, ends_at, \
     min_order_cents, active, created_at, updated_at, version";

impl Repository {
    /// Every sale, newest first.
    pub async fn list_sales(&self) -> Result<Vec<Sale>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM sales ORDER BY created_at DESC",
            SALE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(sale_from_row).collect())
    }

    /// Sales that apply at `now`, oldest first so ties in pricing favour
    /// the longest-running offer.
    pub async fn list_live_sales(&self, now: DateTime<Utc>) -> Result<Vec<Sale>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_live_sales(&mut conn, now).await
    }

    pub async fn get_sale(&self, id: &str) -> Result<Option<Sale>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM sales WHERE id = ?", SALE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().and_then(sale_from_row))
    }

    pub async fn create_sale(&self, request: &CreateSaleRequest) -> Result<Sale, AppError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Sale name is required".to_string()));
        }
        validate_sale_terms(
            request.kind,
            request.value,
            request.starts_at,
            request.ends_at,
            request.min_order_cents,
        )
        .map_err(AppError::Validation)?;

        let collection_id = non_empty(request.collection_id.as_ref());
        if let Some(collection_id) = &collection_id {
            self.ensure_collection(collection_id).await?;
        }

        let now = now_rfc3339();
        let sale = Sale {
            id: new_id(),
            name,
            description: non_empty(request.description.as_ref()),
            code: non_empty(request.code.as_ref()),
            kind: request.kind,
            value: request.value,
            collection_id,
            starts_at: request.starts_at,
            ends_at: request.ends_at,
            min_order_cents: request.min_order_cents.filter(|m| *m > 0),
            active: request.active,
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        };

        sqlx::query(&format!(
            "INSERT INTO sales ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            SALE_COLUMNS
        ))
        .bind(&sale.id)
        .bind(&sale.name)
        .bind(&sale.description)
        .bind(&sale.code)
        .bind(sale.kind.as_str())
        .bind(sale.value)
        .bind(&sale.collection_id)
        .bind(sale.starts_at.map(|d| d.to_rfc3339()))
        .bind(sale.ends_at.map(|d| d.to_rfc3339()))
        .bind(sale.min_order_cents)
        .bind(sale.active as i32)
        .bind(&sale.created_at)
        .bind(&sale.updated_at)
        .bind(sale.version)
        .execute(&self.pool)
        .await?;

        tracing::info!("Created sale {} ({})", sale.id, sale.name);
        Ok(sale)
    }

    /// Apply a partial update. Empty strings clear the description, code
    /// and collection; a zero minimum clears the minimum.
    pub async fn update_sale(&self, id: &str, request: &UpdateSaleRequest) -> Result<Sale, AppError> {
        let existing = self
            .get_sale(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Sale {} not found", id)))?;
        check_version("Sale", request.expected_version, existing.version)?;

        let name = request
            .name
            .as_ref()
            .map(|n| n.trim().to_string())
            .unwrap_or(existing.name.clone());
        if name.is_empty() {
            return Err(AppError::Validation("Sale name is required".to_string()));
        }
        let description = match &request.description {
            Some(d) => non_empty(Some(d)),
            None => existing.description.clone(),
        };
        let code = match &request.code {
            Some(c) => non_empty(Some(c)),
            None => existing.code.clone(),
        };
        let collection_id = match &request.collection_id {
            Some(c) => non_empty(Some(c)),
            None => existing.collection_id.clone(),
        };
        let kind = request.kind.unwrap_or(existing.kind);
        let value = request.value.unwrap_or(existing.value);
        let starts_at = request.starts_at.or(existing.starts_at);
        let ends_at = request.ends_at.or(existing.ends_at);
        let min_order_cents = match request.min_order_cents {
            Some(0) => None,
            Some(m) => Some(m),
            None => existing.min_order_cents,
        };
        let active = request.active.unwrap_or(existing.active);

        validate_sale_terms(kind, value, starts_at, ends_at, min_order_cents)
            .map_err(AppError::Validation)?;
        if let Some(collection_id) = &collection_id {
            self.ensure_collection(collection_id).await?;
        }

        let now = now_rfc3339();
        let result = sqlx::query(
            "UPDATE sales SET name = ?, description = ?, code = ?, kind = ?, value = ?, collection_id = ?, starts_at = ?, ends_at = ?, min_order_cents = ?, active = ?, updated_at = ?, version = version + 1 WHERE id = ? AND version = ?",
        )
        .bind(&name)
        .bind(&description)
        .bind(&code)
        .bind(kind.as_str())
        .bind(value)
        .bind(&collection_id)
        .bind(starts_at.map(|d| d.to_rfc3339()))
        .bind(ends_at.map(|d| d.to_rfc3339()))
        .bind(min_order_cents)
        .bind(active as i32)
        .bind(&now)
        .bind(id)
        .bind(existing.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.get_sale(id).await?;
            return Err(AppError::VersionMismatch {
                message: "Concurrent modification detected".to_string(),
                current_version: current.map(|s| s.version).unwrap_or(0),
            });
        }

        Ok(Sale {
            name,
            description,
            code,
            kind,
            value,
            collection_id,
            starts_at,
            ends_at,
            min_order_cents,
            active,
            updated_at: now,
            version: existing.version + 1,
            ..existing
        })
    }

    pub async fn delete_sale(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM sales WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Sale {} not found", id)));
        }

        tracing::info!("Deleted sale {}", id);
        Ok(())
    }

    async fn ensure_collection(&self, collection_id: &str) -> Result<(), AppError> {
        let exists = sqlx::query("SELECT 1 FROM collections WHERE id = ?")
            .bind(collection_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(AppError::Validation(format!(
                "Collection {} does not exist",
                collection_id
            )));
        }
        Ok(())
    }
}

pub(super) async fn fetch_live_sales(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> Result<Vec<Sale>, AppError> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM sales WHERE active = 1 ORDER BY created_at, id",
        SALE_COLUMNS
    ))
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .filter_map(sale_from_row)
        .filter(|sale| sale_is_live(sale, now))
        .collect())
}

fn sale_from_row(row: &SqliteRow) -> Option<Sale> {
    let kind: String = row.get("kind");
    let Some(kind) = DiscountKind::parse(&kind) else {
        tracing::warn!("Skipping sale with unknown discount kind {:?}", kind);
        return None;
    };
    let active: i32 = row.get("active");
    Some(Sale {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        code: row.get("code"),
        kind,
        value: row.get("value"),
        collection_id: row.get("collection_id"),
        starts_at: parse_timestamp(row.get("starts_at")),
        ends_at: parse_timestamp(row.get("ends_at")),
        min_order_cents: row.get("min_order_cents"),
        active: active != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    })
}
