//! One-off data maintenance jobs behind the `store-maint` binary.
//!
//! Each job works through the same [`Repository`] as the server and is safe
//! to re-run.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::db::{NewProduct, Repository};
use crate::errors::AppError;
use crate::models::{
    is_valid_setting_key, normalize_email, parse_size_inputs, slugify, validate_product_fields,
    AdminUpdateUserRequest, CreateCollectionRequest, Order, Role, SizeStockInput, User,
    ADMIN_ACCESS_KEY, MIN_ADMIN_ACCESS_KEY_LEN,
};
use crate::search::SearchIndex;
use crate::sizing::normalize_size_labels;

/// Seed document read by [`seed`].
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedData {
    #[serde(default)]
    pub collections: Vec<SeedCollection>,
    #[serde(default)]
    pub products: Vec<SeedProduct>,
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedCollection {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedProduct {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    pub price_cents: i64,
    #[serde(default)]
    pub compare_at_cents: Option<i64>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<SizeStockInput>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Collection slugs
    #[serde(default)]
    pub collections: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// What a seed run created.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub collections: usize,
    pub products: usize,
    pub settings: usize,
    pub skipped: usize,
}

/// Load collections, products and settings. Slugs and keys that already
/// exist are left alone.
pub async fn seed(repo: &Repository, data: &SeedData) -> Result<SeedReport, AppError> {
    let mut report = SeedReport::default();

    for entry in &data.collections {
        let slug = slugify(entry.slug.as_deref().unwrap_or(&entry.name));
        if repo.collection_slug_exists(&slug).await? {
            tracing::debug!("Collection {} already exists", slug);
            report.skipped += 1;
            continue;
        }
        repo.create_collection(&CreateCollectionRequest {
            name: entry.name.clone(),
            slug: Some(slug),
            description: entry.description.clone(),
            image_url: entry.image_url.clone(),
        })
        .await?;
        report.collections += 1;
    }

    for entry in &data.products {
        let slug = slugify(entry.slug.as_deref().unwrap_or(&entry.name));
        if repo.product_slug_exists(&slug).await? {
            tracing::debug!("Product {} already exists", slug);
            report.skipped += 1;
            continue;
        }

        validate_product_fields(&entry.name, &entry.category, entry.price_cents, entry.compare_at_cents)
            .map_err(|e| AppError::Validation(format!("{}: {}", entry.name, e)))?;
        let sizes = parse_size_inputs(&entry.sizes)
            .map_err(|e| AppError::Validation(format!("{}: {}", entry.name, e)))?;

        let mut collection_ids = Vec::with_capacity(entry.collections.len());
        for collection_slug in &entry.collections {
            let collection = repo.find_collection(collection_slug).await?.ok_or_else(|| {
                AppError::Validation(format!(
                    "{}: unknown collection {}",
                    entry.name, collection_slug
                ))
            })?;
            collection_ids.push(collection.id);
        }

        repo.create_product(&NewProduct {
            name: entry.name.trim().to_string(),
            slug: Some(slug),
            description: entry.description.clone(),
            category: entry.category.trim().to_string(),
            price_cents: entry.price_cents,
            compare_at_cents: entry.compare_at_cents,
            images: entry.images.clone(),
            sizes,
            tags: entry.tags.clone(),
            collection_ids,
            active: entry.active,
        })
        .await?;
        report.products += 1;
    }

    for (key, value) in &data.settings {
        if !is_valid_setting_key(key) {
            return Err(AppError::Validation(format!("Invalid setting key: {}", key)));
        }
        if repo.get_setting(key).await?.is_some() {
            report.skipped += 1;
            continue;
        }
        repo.put_setting(key, value).await?;
        report.settings += 1;
    }

    tracing::info!(
        "Seeded {} collections, {} products, {} settings ({} skipped)",
        report.collections,
        report.products,
        report.settings,
        report.skipped
    );
    Ok(report)
}

/// Rewrite every product's size rows into canonical labels, merging aliases
/// and dropping labels that are not sizes. Returns the number of products
/// changed.
pub async fn normalize_sizes(repo: &Repository) -> Result<usize, AppError> {
    let mut changed = 0;

    for product_id in repo.product_ids().await? {
        let raw = repo.raw_size_rows(&product_id).await?;
        let (sizes, rejected) = normalize_size_labels(&raw);

        for label in &rejected {
            tracing::warn!("Dropping unknown size {:?} from product {}", label, product_id);
        }

        let mut before: Vec<(String, i64)> = raw.clone();
        before.sort();
        let mut after: Vec<(String, i64)> = sizes
            .iter()
            .map(|s| (s.size.as_str().to_string(), s.stock))
            .collect();
        after.sort();

        if before != after {
            repo.rewrite_size_rows(&product_id, &sizes).await?;
            tracing::info!("Normalized sizes for product {}", product_id);
            changed += 1;
        }
    }

    tracing::info!("Size normalization changed {} products", changed);
    Ok(changed)
}

/// Subtotal and total implied by an order's items and its stored discount
/// and shipping, or `None` if the amounts overflow.
pub fn recompute_totals(order: &Order) -> Option<(i64, i64)> {
    let subtotal = order.items.iter().try_fold(0i64, |acc, item| {
        item.unit_price_cents
            .checked_mul(item.quantity)
            .and_then(|line| acc.checked_add(line))
    })?;
    let total = subtotal
        .checked_sub(order.discount_cents)?
        .checked_add(order.shipping_cents)?
        .max(0);
    Some((subtotal, total))
}

/// Fix orders whose stored totals disagree with their items. Returns the
/// number of orders fixed.
pub async fn recalc_orders(repo: &Repository) -> Result<usize, AppError> {
    let mut fixed = 0;

    for order in repo.list_orders(None, None).await? {
        let Some((subtotal, total)) = recompute_totals(&order) else {
            tracing::warn!("Order {}: item amounts overflow, skipped", order.order_number);
            continue;
        };
        if subtotal != order.subtotal_cents || total != order.total_cents {
            tracing::info!(
                "Order {}: subtotal {} -> {}, total {} -> {}",
                order.order_number,
                order.subtotal_cents,
                subtotal,
                order.total_cents,
                total
            );
            repo.update_order_totals(&order.id, subtotal, total).await?;
            fixed += 1;
        }
    }

    tracing::info!("Recalculated totals on {} orders", fixed);
    Ok(fixed)
}

/// Give an existing account the admin role.
pub async fn promote(repo: &Repository, email: &str) -> Result<User, AppError> {
    let email = normalize_email(email);
    let credentials = repo
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No account for {}", email)))?;

    let user = repo
        .update_user(
            &credentials.user.id,
            &AdminUpdateUserRequest {
                role: Some(Role::Admin),
                ..Default::default()
            },
        )
        .await?;
    tracing::info!("Promoted {} to admin", user.email);
    Ok(user)
}

/// Store the key that lets a signed-in user claim admin access.
pub async fn set_admin_key(repo: &Repository, key: &str) -> Result<(), AppError> {
    let key = key.trim();
    if key.chars().count() < MIN_ADMIN_ACCESS_KEY_LEN {
        return Err(AppError::Validation(format!(
            "Admin access key must be at least {} characters",
            MIN_ADMIN_ACCESS_KEY_LEN
        )));
    }
    repo.put_setting(ADMIN_ACCESS_KEY, &serde_json::Value::String(key.to_string()))
        .await?;
    Ok(())
}

/// Rebuild the product search index. Returns the number of products read.
pub async fn reindex(repo: &Repository, search: &SearchIndex) -> Result<usize, AppError> {
    let products = repo.list_all_products().await?;
    let collections = repo.list_collections().await?;
    search.rebuild(&products, &collections).await?;
    Ok(products.len())
}
