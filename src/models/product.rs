//! Product catalog models.

use serde::{Deserialize, Serialize};

use crate::sizing::SizeStock;

/// A garment listed in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: String,
    pub price_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compare_at_cents: Option<i64>,
    pub images: Vec<String>,
    pub sizes: Vec<SizeStock>,
    pub tags: Vec<String>,
    pub collection_ids: Vec<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

impl Product {
    pub fn total_stock(&self) -> i64 {
        self.sizes.iter().map(|s| s.stock).sum()
    }
}

/// Size and stock as submitted by admin forms; labels may be aliases.
#[derive(Debug, Clone, Deserialize)]
pub struct SizeStockInput {
    pub size: String,
    #[serde(default)]
    pub stock: i64,
}

/// Request body for creating a product.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
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
    #[serde(default)]
    pub collection_ids: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Request body for updating a product.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub compare_at_cents: Option<i64>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub sizes: Option<Vec<SizeStockInput>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub collection_ids: Option<Vec<String>>,
    #[serde(default)]
    pub active: Option<bool>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Request body for replacing a product's stock levels.
#[derive(Debug, Clone, Deserialize)]
pub struct SetStockRequest {
    pub sizes: Vec<SizeStockInput>,
}

/// Sort order for catalog listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

impl ProductSort {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "newest" => Some(ProductSort::Newest),
            "price_asc" => Some(ProductSort::PriceAsc),
            "price_desc" => Some(ProductSort::PriceDesc),
            "name" => Some(ProductSort::Name),
            _ => None,
        }
    }

    pub fn order_by(&self) -> &'static str {
        match self {
            ProductSort::Newest => "p.created_at DESC, p.id",
            ProductSort::PriceAsc => "p.price_cents ASC, p.name",
            ProductSort::PriceDesc => "p.price_cents DESC, p.name",
            ProductSort::Name => "p.name COLLATE NOCASE ASC",
        }
    }
}

/// Catalog listing filter.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub collection_id: Option<String>,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
    pub size: Option<crate::sizing::Size>,
    pub active_only: bool,
    pub sort: ProductSort,
    pub limit: i64,
    pub offset: i64,
}

/// One page of a catalog listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Parse admin-supplied sizes. Aliases are accepted and duplicates merged;
/// unknown labels and negative stock are rejected.
pub fn parse_size_inputs(inputs: &[SizeStockInput]) -> Result<Vec<SizeStock>, String> {
    if let Some(bad) = inputs.iter().find(|s| s.stock < 0) {
        return Err(format!("Stock for size {} cannot be negative", bad.size));
    }
    let pairs: Vec<(&str, i64)> = inputs.iter().map(|s| (s.size.as_str(), s.stock)).collect();
    let (sizes, rejected) = crate::sizing::normalize_size_labels(&pairs);
    match rejected.first() {
        Some(label) => Err(format!("Unknown size: {}", label)),
        None => Ok(sizes),
    }
}

/// Field rules shared by product create and update.
pub fn validate_product_fields(
    name: &str,
    category: &str,
    price_cents: i64,
    compare_at_cents: Option<i64>,
) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Product name is required".to_string());
    }
    if category.trim().is_empty() {
        return Err("Category is required".to_string());
    }
    if price_cents <= 0 {
        return Err("Price must be positive".to_string());
    }
    if compare_at_cents.is_some_and(|c| c <= price_cents) {
        return Err("Compare-at price must be higher than the price".to_string());
    }
    Ok(())
}
