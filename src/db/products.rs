//! Product catalog queries.

use std::collections::HashMap;

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use super::repository::{json_list, new_id, non_empty, now_rfc3339, to_json_list};
use super::Repository;
use crate::errors::AppError;
use crate::models::{
    check_version, slugify, CreateProductRequest, LowStockEntry, Product, ProductFilter,
    ProductPage, UpdateProductRequest,
};
use crate::sizing::{Size, SizeStock};

const PRODUCT_COLUMNS: &str = "p.id, p.name, p.slug, p.description, p.category, p.price_cents, \
     p.compare_at_cents, p.images, p.tags, p.active, p.created_at, p.updated_at, p.version";

/// Largest page a catalog listing may request.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Fields of a new product after validation.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub category: String,
    pub price_cents: i64,
    pub compare_at_cents: Option<i64>,
    pub images: Vec<String>,
    pub sizes: Vec<SizeStock>,
    pub tags: Vec<String>,
    pub collection_ids: Vec<String>,
    pub active: bool,
}

impl NewProduct {
    pub fn from_request(request: &CreateProductRequest, sizes: Vec<SizeStock>) -> Self {
        Self {
            name: request.name.trim().to_string(),
            slug: non_empty(request.slug.as_ref()),
            description: non_empty(request.description.as_ref()),
            category: request.category.trim().to_string(),
            price_cents: request.price_cents,
            compare_at_cents: request.compare_at_cents,
            images: request.images.clone(),
            sizes,
            tags: request.tags.clone(),
            collection_ids: request.collection_ids.clone(),
            active: request.active,
        }
    }
}

impl Repository {
    /// One page of the catalog.
    pub async fn list_products(&self, filter: &ProductFilter) -> Result<ProductPage, AppError> {
        let limit = filter.limit.clamp(1, MAX_PAGE_SIZE);
        let offset = filter.offset.max(0);

        let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM products p WHERE 1 = 1");
        push_filter(&mut count_query, filter);
        let total: i64 = count_query
            .build()
            .fetch_one(&self.pool)
            .await?
            .get("total");

        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM products p WHERE 1 = 1",
            PRODUCT_COLUMNS
        ));
        push_filter(&mut select, filter);
        select.push(format!(" ORDER BY {}", filter.sort.order_by()));
        select.push(" LIMIT ").push_bind(limit);
        select.push(" OFFSET ").push_bind(offset);

        let mut conn = self.pool.acquire().await?;
        let rows = select.build().fetch_all(&mut *conn).await?;
        let items = hydrate(&mut conn, rows).await?;

        Ok(ProductPage {
            items,
            total,
            limit,
            offset,
        })
    }

    /// Every product, active or not, ordered by name.
    pub async fn list_all_products(&self) -> Result<Vec<Product>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(&format!(
            "SELECT {} FROM products p ORDER BY p.name COLLATE NOCASE",
            PRODUCT_COLUMNS
        ))
        .fetch_all(&mut *conn)
        .await?;
        hydrate(&mut conn, rows).await
    }

    pub async fn get_product(&self, id: &str) -> Result<Option<Product>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, id).await
    }

    pub async fn get_product_by_slug(&self, slug: &str) -> Result<Option<Product>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(&format!(
            "SELECT {} FROM products p WHERE p.slug = ?",
            PRODUCT_COLUMNS
        ))
        .bind(slug)
        .fetch_all(&mut *conn)
        .await?;
        Ok(hydrate(&mut conn, rows).await?.into_iter().next())
    }

    /// Resolve a path segment that may be either an id or a slug.
    pub async fn find_product(&self, id_or_slug: &str) -> Result<Option<Product>, AppError> {
        match self.get_product(id_or_slug).await? {
            Some(product) => Ok(Some(product)),
            None => self.get_product_by_slug(id_or_slug).await,
        }
    }

    /// Fetch several products by id, keeping the requested order and
    /// skipping ids that do not exist.
    pub async fn get_products_by_ids(&self, ids: &[String]) -> Result<Vec<Product>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.acquire().await?;
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM products p WHERE p.id IN (",
            PRODUCT_COLUMNS
        ));
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");
        let rows = query.build().fetch_all(&mut *conn).await?;
        let mut by_id: HashMap<String, Product> = hydrate(&mut conn, rows)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Create a product with its sizes and collection membership.
    pub async fn create_product(&self, new: &NewProduct) -> Result<Product, AppError> {
        let mut tx = self.pool.begin().await?;

        ensure_collections_exist(&mut tx, &new.collection_ids).await?;

        let id = new_id();
        let now = now_rfc3339();
        let base_slug = new.slug.as_deref().map(slugify).unwrap_or_else(|| slugify(&new.name));
        let slug = unique_slug(&mut tx, "products", &base_slug).await?;

        sqlx::query(
            "INSERT INTO products (id, name, slug, description, category, price_cents, compare_at_cents, images, tags, active, created_at, updated_at, version) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(&id)
        .bind(&new.name)
        .bind(&slug)
        .bind(&new.description)
        .bind(&new.category)
        .bind(new.price_cents)
        .bind(new.compare_at_cents)
        .bind(to_json_list(&new.images)?)
        .bind(to_json_list(&new.tags)?)
        .bind(new.active as i32)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        replace_sizes(&mut tx, &id, &new.sizes).await?;
        replace_product_collections(&mut tx, &id, &new.collection_ids).await?;

        let product = fetch_product(&mut tx, &id)
            .await?
            .ok_or_else(|| AppError::Internal("Product vanished after insert".to_string()))?;
        tx.commit().await?;

        tracing::info!("Created product {} ({})", product.id, product.slug);
        Ok(product)
    }

    /// Apply a partial update with optimistic concurrency control.
    pub async fn update_product(
        &self,
        id: &str,
        request: &UpdateProductRequest,
        sizes: Option<Vec<SizeStock>>,
    ) -> Result<Product, AppError> {
        let mut tx = self.pool.begin().await?;

        let existing = fetch_product(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", id)))?;
        check_version("Product", request.expected_version, existing.version)?;

        let name = request
            .name
            .as_ref()
            .map(|n| n.trim().to_string())
            .unwrap_or(existing.name.clone());
        let description = match &request.description {
            Some(d) => non_empty(Some(d)),
            None => existing.description.clone(),
        };
        let category = request
            .category
            .as_ref()
            .map(|c| c.trim().to_string())
            .unwrap_or(existing.category.clone());
        let price_cents = request.price_cents.unwrap_or(existing.price_cents);
        // A non-positive compare-at price clears it.
        let compare_at_cents = match request.compare_at_cents {
            Some(c) if c <= 0 => None,
            Some(c) => Some(c),
            None => existing.compare_at_cents,
        };
        crate::models::validate_product_fields(&name, &category, price_cents, compare_at_cents)
            .map_err(AppError::Validation)?;

        let images = request.images.clone().unwrap_or(existing.images.clone());
        let tags = request.tags.clone().unwrap_or(existing.tags.clone());
        let active = request.active.unwrap_or(existing.active);
        let now = now_rfc3339();

        let result = sqlx::query(
            "UPDATE products SET name = ?, description = ?, category = ?, price_cents = ?, compare_at_cents = ?, images = ?, tags = ?, active = ?, updated_at = ?, version = version + 1 WHERE id = ? AND version = ?",
        )
        .bind(&name)
        .bind(&description)
        .bind(&category)
        .bind(price_cents)
        .bind(compare_at_cents)
        .bind(to_json_list(&images)?)
        .bind(to_json_list(&tags)?)
        .bind(active as i32)
        .bind(&now)
        .bind(id)
        .bind(existing.version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::VersionMismatch {
                message: "Concurrent modification detected".to_string(),
                current_version: existing.version,
            });
        }

        if let Some(sizes) = &sizes {
            replace_sizes(&mut tx, id, sizes).await?;
        }
        if let Some(collection_ids) = &request.collection_ids {
            ensure_collections_exist(&mut tx, collection_ids).await?;
            replace_product_collections(&mut tx, id, collection_ids).await?;
        }

        let product = fetch_product(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", id)))?;
        tx.commit().await?;

        Ok(product)
    }

    /// Replace a product's stock levels.
    pub async fn set_product_stock(&self, id: &str, sizes: &[SizeStock]) -> Result<Product, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE products SET updated_at = ?, version = version + 1 WHERE id = ?")
            .bind(now_rfc3339())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Product {} not found", id)));
        }

        replace_sizes(&mut tx, id, sizes).await?;

        let product = fetch_product(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", id)))?;
        tx.commit().await?;

        tracing::info!("Stock updated for product {}: {} units", id, product.total_stock());
        Ok(product)
    }

    pub async fn delete_product(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Product {} not found", id)));
        }

        tracing::info!("Deleted product {}", id);
        Ok(())
    }

    /// Sizes of active products with stock at or below `threshold`.
    pub async fn low_stock(&self, threshold: i64) -> Result<Vec<LowStockEntry>, AppError> {
        let rows = sqlx::query(
            "SELECT p.id, p.name, ps.size, ps.stock FROM product_sizes ps JOIN products p ON p.id = ps.product_id WHERE p.active = 1 AND ps.stock <= ? ORDER BY ps.stock, p.name",
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let label: String = row.get("size");
                Some(LowStockEntry {
                    product_id: row.get("id"),
                    name: row.get("name"),
                    size: Size::parse(&label)?,
                    stock: row.get("stock"),
                })
            })
            .collect())
    }

    /// Raw size rows for one product, labels exactly as stored.
    pub async fn raw_size_rows(&self, product_id: &str) -> Result<Vec<(String, i64)>, AppError> {
        let rows = sqlx::query("SELECT size, stock FROM product_sizes WHERE product_id = ? ORDER BY size")
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| (r.get("size"), r.get("stock"))).collect())
    }

    /// Overwrite a product's size rows without touching its version.
    pub async fn rewrite_size_rows(&self, product_id: &str, sizes: &[SizeStock]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        replace_sizes(&mut tx, product_id, sizes).await?;
        tx.commit().await?;
        Ok(())
    }

    /// All product ids.
    pub async fn product_ids(&self) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query("SELECT id FROM products ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    pub async fn product_slug_exists(&self, slug: &str) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT 1 FROM products WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

fn push_filter(query: &mut QueryBuilder<'_, Sqlite>, filter: &ProductFilter) {
    if filter.active_only {
        query.push(" AND p.active = 1");
    }
    if let Some(category) = &filter.category {
        query
            .push(" AND p.category = ")
            .push_bind(category.clone())
            .push(" COLLATE NOCASE");
    }
    if let Some(collection_id) = &filter.collection_id {
        query
            .push(" AND EXISTS (SELECT 1 FROM product_collections pc WHERE pc.product_id = p.id AND pc.collection_id = ")
            .push_bind(collection_id.clone())
            .push(")");
    }
    if let Some(min) = filter.min_price_cents {
        query.push(" AND p.price_cents >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price_cents {
        query.push(" AND p.price_cents <= ").push_bind(max);
    }
    if let Some(size) = filter.size {
        query
            .push(" AND EXISTS (SELECT 1 FROM product_sizes ps WHERE ps.product_id = p.id AND ps.stock > 0 AND ps.size = ")
            .push_bind(size.as_str())
            .push(")");
    }
}

/// Load one product with its sizes and collections on an existing connection.
pub(super) async fn fetch_product(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Product>, AppError> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM products p WHERE p.id = ?",
        PRODUCT_COLUMNS
    ))
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(hydrate(conn, rows).await?.into_iter().next())
}

/// Attach sizes and collection ids to product rows, preserving row order.
async fn hydrate(conn: &mut SqliteConnection, rows: Vec<SqliteRow>) -> Result<Vec<Product>, AppError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<String> = rows.iter().map(|r| r.get("id")).collect();

    let mut sizes_query =
        QueryBuilder::<Sqlite>::new("SELECT product_id, size, stock FROM product_sizes WHERE product_id IN (");
    let mut separated = sizes_query.separated(", ");
    for id in &ids {
        separated.push_bind(id.clone());
    }
    separated.push_unseparated(")");
    let size_rows = sizes_query.build().fetch_all(&mut *conn).await?;

    let mut sizes: HashMap<String, Vec<SizeStock>> = HashMap::new();
    for row in &size_rows {
        let product_id: String = row.get("product_id");
        let label: String = row.get("size");
        match Size::parse(&label) {
            Some(size) => sizes.entry(product_id).or_default().push(SizeStock {
                size,
                stock: row.get("stock"),
            }),
            None => tracing::warn!("Skipping unknown size label {:?} on product {}", label, product_id),
        }
    }

    let mut collections_query = QueryBuilder::<Sqlite>::new(
        "SELECT product_id, collection_id FROM product_collections WHERE product_id IN (",
    );
    let mut separated = collections_query.separated(", ");
    for id in &ids {
        separated.push_bind(id.clone());
    }
    separated.push_unseparated(") ORDER BY collection_id");
    let collection_rows = collections_query.build().fetch_all(&mut *conn).await?;

    let mut collections: HashMap<String, Vec<String>> = HashMap::new();
    for row in &collection_rows {
        collections
            .entry(row.get("product_id"))
            .or_default()
            .push(row.get("collection_id"));
    }

    Ok(rows
        .iter()
        .map(|row| {
            let id: String = row.get("id");
            let mut product_sizes = sizes.remove(&id).unwrap_or_default();
            product_sizes.sort_by_key(|s| s.size);
            let collection_ids = collections.remove(&id).unwrap_or_default();
            product_from_row(row, product_sizes, collection_ids)
        })
        .collect())
}

fn product_from_row(row: &SqliteRow, sizes: Vec<SizeStock>, collection_ids: Vec<String>) -> Product {
    let active: i32 = row.get("active");
    Product {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        category: row.get("category"),
        price_cents: row.get("price_cents"),
        compare_at_cents: row.get("compare_at_cents"),
        images: json_list(row, "images"),
        sizes,
        tags: json_list(row, "tags"),
        collection_ids,
        active: active != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

async fn replace_sizes(conn: &mut SqliteConnection, product_id: &str, sizes: &[SizeStock]) -> Result<(), AppError> {
    sqlx::query("DELETE FROM product_sizes WHERE product_id = ?")
        .bind(product_id)
        .execute(&mut *conn)
        .await?;

    for size in sizes {
        sqlx::query("INSERT INTO product_sizes (product_id, size, stock) VALUES (?, ?, ?)")
            .bind(product_id)
            .bind(size.size.as_str())
            .bind(size.stock)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn replace_product_collections(
    conn: &mut SqliteConnection,
    product_id: &str,
    collection_ids: &[String],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM product_collections WHERE product_id = ?")
        .bind(product_id)
        .execute(&mut *conn)
        .await?;

    for collection_id in collection_ids {
        sqlx::query("INSERT OR IGNORE INTO product_collections (product_id, collection_id) VALUES (?, ?)")
            .bind(product_id)
            .bind(collection_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn ensure_collections_exist(conn: &mut SqliteConnection, collection_ids: &[String]) -> Result<(), AppError> {
    for collection_id in collection_ids {
        let exists = sqlx::query("SELECT 1 FROM collections WHERE id = ?")
            .bind(collection_id)
            .fetch_optional(&mut *conn)
            .await?;
        if exists.is_none() {
            return Err(AppError::Validation(format!(
                "Collection {} does not exist",
                collection_id
            )));
        }
    }
    Ok(())
}

/// Append `-2`, `-3`, … to `base` until it is free in `table`.
pub(super) async fn unique_slug(conn: &mut SqliteConnection, table: &str, base: &str) -> Result<String, AppError> {
    let sql = format!("SELECT 1 FROM {} WHERE slug = ?", table);
    let mut candidate = base.to_string();
    let mut n = 2;
    while sqlx::query(&sql)
        .bind(&candidate)
        .fetch_optional(&mut *conn)
        .await?
        .is_some()
    {
        candidate = format!("{}-{}", base, n);
        n += 1;
    }
    Ok(candidate)
}
