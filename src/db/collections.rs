//! Collection queries.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::products::unique_slug;
use super::repository::{new_id, non_empty, now_rfc3339};
use super::Repository;
use crate::errors::AppError;
use crate::models::{
    check_version, slugify, Collection, CollectionDetail, CreateCollectionRequest, ProductFilter,
    ProductSort, UpdateCollectionRequest,
};

const COLLECTION_SELECT: &str = "SELECT c.id, c.name, c.slug, c.description, c.image_url, c.created_at, c.updated_at, c.version, \
     (SELECT COUNT(*) FROM product_collections pc WHERE pc.collection_id = c.id) AS product_count \
     FROM collections c";

impl Repository {
    /// All collections with their product counts, by name.
    pub async fn list_collections(&self) -> Result<Vec<Collection>, AppError> {
        let rows = sqlx::query(&format!("{} ORDER BY c.name COLLATE NOCASE", COLLECTION_SELECT))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(collection_from_row).collect())
    }

    pub async fn get_collection(&self, id: &str) -> Result<Option<Collection>, AppError> {
        let row = sqlx::query(&format!("{} WHERE c.id = ?", COLLECTION_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(collection_from_row))
    }

    /// Resolve a collection by id, falling back to slug.
    pub async fn find_collection(&self, id_or_slug: &str) -> Result<Option<Collection>, AppError> {
        let row = sqlx::query(&format!(
            "{} WHERE c.id = ? OR c.slug = ? ORDER BY c.id = ? DESC LIMIT 1",
            COLLECTION_SELECT
        ))
        .bind(id_or_slug)
        .bind(id_or_slug)
        .bind(id_or_slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(collection_from_row))
    }

    /// A collection with its products; `active_only` hides unpublished ones.
    pub async fn collection_detail(
        &self,
        id_or_slug: &str,
        active_only: bool,
    ) -> Result<Option<CollectionDetail>, AppError> {
        let Some(collection) = self.find_collection(id_or_slug).await? else {
            return Ok(None);
        };

        let page = self
            .list_products(&ProductFilter {
                collection_id: Some(collection.id.clone()),
                active_only,
                sort: ProductSort::Name,
                limit: super::products::MAX_PAGE_SIZE,
                ..Default::default()
            })
            .await?;

        Ok(Some(CollectionDetail {
            collection,
            products: page.items,
        }))
    }

    /// Ids of every product in a collection, active or not.
    pub async fn collection_member_ids(&self, id: &str) -> Result<Vec<String>, AppError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT product_id FROM product_collections WHERE collection_id = ? ORDER BY product_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    pub async fn create_collection(&self, request: &CreateCollectionRequest) -> Result<Collection, AppError> {
        let mut tx = self.pool.begin().await?;

        let id = new_id();
        let now = now_rfc3339();
        let base_slug = non_empty(request.slug.as_ref())
            .map(|s| slugify(&s))
            .unwrap_or_else(|| slugify(&request.name));
        let slug = unique_slug(&mut tx, "collections", &base_slug).await?;

        sqlx::query(
            "INSERT INTO collections (id, name, slug, description, image_url, created_at, updated_at, version) VALUES (?, ?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(&id)
        .bind(request.name.trim())
        .bind(&slug)
        .bind(non_empty(request.description.as_ref()))
        .bind(non_empty(request.image_url.as_ref()))
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!("Created collection {} ({})", id, slug);

        Ok(Collection {
            id,
            name: request.name.trim().to_string(),
            slug,
            description: non_empty(request.description.as_ref()),
            image_url: non_empty(request.image_url.as_ref()),
            product_count: 0,
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        })
    }

    /// Apply a partial update with optimistic concurrency control.
    pub async fn update_collection(
        &self,
        id: &str,
        request: &UpdateCollectionRequest,
    ) -> Result<Collection, AppError> {
        let existing = self
            .get_collection(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Collection {} not found", id)))?;
        check_version("Collection", request.expected_version, existing.version)?;

        let name = request
            .name
            .as_ref()
            .map(|n| n.trim().to_string())
            .unwrap_or(existing.name.clone());
        if name.is_empty() {
            return Err(AppError::Validation("Collection name is required".to_string()));
        }
        let description = match &request.description {
            Some(d) => non_empty(Some(d)),
            None => existing.description.clone(),
        };
        let image_url = match &request.image_url {
            Some(u) => non_empty(Some(u)),
            None => existing.image_url.clone(),
        };
        let now = now_rfc3339();

        let result = sqlx::query(
            "UPDATE collections SET name = ?, description = ?, image_url = ?, updated_at = ?, version = version + 1 WHERE id = ? AND version = ?",
        )
        .bind(&name)
        .bind(&description)
        .bind(&image_url)
        .bind(&now)
        .bind(id)
        .bind(existing.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.get_collection(id).await?;
            return Err(AppError::VersionMismatch {
                message: "Concurrent modification detected".to_string(),
                current_version: current.map(|c| c.version).unwrap_or(0),
            });
        }

        Ok(Collection {
            name,
            description,
            image_url,
            updated_at: now,
            version: existing.version + 1,
            ..existing
        })
    }

    /// Delete a collection. Refused while a sale is scoped to it.
    pub async fn delete_collection(&self, id: &str) -> Result<(), AppError> {
        let sale = sqlx::query("SELECT name FROM sales WHERE collection_id = ? LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = sale {
            let name: String = row.get("name");
            return Err(AppError::Conflict(format!(
                "Collection is used by sale \"{}\"",
                name
            )));
        }

        let result = sqlx::query("DELETE FROM collections WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Collection {} not found", id)));
        }

        tracing::info!("Deleted collection {}", id);
        Ok(())
    }

    /// Replace the set of products in a collection.
    pub async fn set_collection_products(
        &self,
        id: &str,
        product_ids: &[String],
    ) -> Result<Collection, AppError> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM collections WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!("Collection {} not found", id)));
        }

        for product_id in product_ids {
            let found = sqlx::query("SELECT 1 FROM products WHERE id = ?")
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await?;
            if found.is_none() {
                return Err(AppError::Validation(format!(
                    "Product {} does not exist",
                    product_id
                )));
            }
        }

        sqlx::query("DELETE FROM product_collections WHERE collection_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for product_id in product_ids {
            sqlx::query("INSERT OR IGNORE INTO product_collections (product_id, collection_id) VALUES (?, ?)")
                .bind(product_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("UPDATE collections SET updated_at = ?, version = version + 1 WHERE id = ?")
            .bind(now_rfc3339())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.get_collection(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Collection {} not found", id)))
    }

    pub async fn collection_slug_exists(&self, slug: &str) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT 1 FROM collections WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

fn collection_from_row(row: &SqliteRow) -> Collection {
    Collection {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        image_url: row.get("image_url"),
        product_count: row.get("product_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_database, NewProduct, MAX_PAGE_SIZE};
    use tempfile::TempDir;

    fn new_product(name: &str, collection_id: &str, active: bool) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            slug: None,
            description: None,
            category: "kurtas".to_string(),
            price_cents: 2500,
            compare_at_cents: None,
            images: vec![],
            sizes: vec![],
            tags: vec![],
            collection_ids: vec![collection_id.to_string()],
            active,
        }
    }

    #[tokio::test]
    async fn test_member_ids_include_every_product() {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("collections.sqlite")).await.unwrap();
        let repo = Repository::new(pool);

        let collection = repo
            .create_collection(&CreateCollectionRequest {
                name: "Festive Edit".to_string(),
                slug: None,
                description: None,
                image_url: None,
            })
            .await
            .unwrap();

        let count = MAX_PAGE_SIZE + 5;
        for i in 0..count {
            repo.create_product(&new_product(&format!("Kurta {:03}", i), &collection.id, i % 2 == 0))
                .await
                .unwrap();
        }

        let ids = repo.collection_member_ids(&collection.id).await.unwrap();
        assert_eq!(ids.len() as i64, count);

        let detail = repo.collection_detail(&collection.id, false).await.unwrap().unwrap();
        assert!((detail.products.len() as i64) < count);

        assert!(repo.collection_member_ids("missing").await.unwrap().is_empty());
    }
}

