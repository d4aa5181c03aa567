//! Product catalog endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{reindex_product, success, ApiResult};
use crate::db::{NewProduct, MAX_PAGE_SIZE};
use crate::errors::AppError;
use crate::models::{
    parse_size_inputs, validate_product_fields, CreateProductRequest, Product, ProductFilter,
    ProductPage, ProductSort, SetStockRequest, UpdateProductRequest,
};
use crate::sizing::{recommend_size, Size, SizeStock};
use crate::AppState;

/// Default catalog page size.
const DEFAULT_PAGE_SIZE: i64 = 24;

/// Query parameters for catalog listings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListQuery {
    pub category: Option<String>,
    /// Collection id or slug
    pub collection: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub size: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Query parameters for full-text search.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// One search hit.
#[derive(Debug, Serialize)]
pub struct ProductSearchHit {
    pub product: Product,
    pub score: f32,
}

/// Search response.
#[derive(Debug, Serialize)]
pub struct ProductSearchResponse {
    pub results: Vec<ProductSearchHit>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Deserialize)]
pub struct SizeRecommendationQuery {
    pub chest: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct SizeRecommendation {
    pub recommended: Option<Size>,
    pub available: Vec<SizeStock>,
}

/// GET /api/products - Active products, filtered and paged.
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> ApiResult<ProductPage> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let sort = match query.sort.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => ProductSort::parse(s)
            .ok_or_else(|| AppError::Validation(format!("Unknown sort order: {}", s)))?,
        None => ProductSort::default(),
    };
    let size = match query.size.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(s) => {
            Some(Size::parse(s).ok_or_else(|| AppError::Validation(format!("Unknown size: {}", s)))?)
        }
        None => None,
    };

    let collection_id = match query.collection.as_deref().filter(|c| !c.is_empty()) {
        Some(c) => match state.repo.find_collection(c).await? {
            Some(collection) => Some(collection.id),
            None => {
                return success(ProductPage {
                    items: Vec::new(),
                    total: 0,
                    limit,
                    offset,
                })
            }
        },
        None => None,
    };

    let filter = ProductFilter {
        category: query.category.filter(|c| !c.trim().is_empty()),
        collection_id,
        min_price_cents: query.min_price,
        max_price_cents: query.max_price,
        size,
        active_only: true,
        sort,
        limit,
        offset,
    };

    success(state.repo.list_products(&filter).await?)
}

/// GET /api/products/search - Full-text search over active products.
pub async fn search_products(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<ProductSearchResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE as usize)
        .clamp(1, MAX_PAGE_SIZE as usize);
    let offset = query.offset.unwrap_or(0);

    let hits = state.search.search(&query.q, limit, offset)?;

    let ids: Vec<String> = hits.hits.iter().map(|h| h.product_id.clone()).collect();
    let products = state.repo.get_products_by_ids(&ids).await?;

    // The index can briefly lag the database, so drop anything no longer active.
    let results = hits
        .hits
        .into_iter()
        .filter_map(|hit| {
            products
                .iter()
                .find(|p| p.id == hit.product_id && p.active)
                .map(|p| ProductSearchHit {
                    product: p.clone(),
                    score: hit.score,
                })
        })
        .collect();

    success(ProductSearchResponse {
        results,
        total: hits.total,
        limit,
        offset,
    })
}

/// GET /api/products/{idOrSlug} - One active product.
pub async fn get_product(
    State(state): State<AppState>,
    Path(id_or_slug): Path<String>,
) -> ApiResult<Product> {
    match state.repo.find_product(&id_or_slug).await? {
        Some(product) if product.active => success(product),
        _ => Err(AppError::NotFound(format!("Product {} not found", id_or_slug))),
    }
}

/// GET /api/products/{id}/size-recommendation?chest= - Suggest a size.
pub async fn size_recommendation(
    State(state): State<AppState>,
    Path(id_or_slug): Path<String>,
    Query(query): Query<SizeRecommendationQuery>,
) -> ApiResult<SizeRecommendation> {
    let chest = query
        .chest
        .ok_or_else(|| AppError::Validation("Chest measurement is required".to_string()))?;

    let product = state
        .repo
        .find_product(&id_or_slug)
        .await?
        .filter(|p| p.active)
        .ok_or_else(|| AppError::NotFound(format!("Product {} not found", id_or_slug)))?;

    success(SizeRecommendation {
        recommended: recommend_size(chest, &product.sizes),
        available: product.sizes.into_iter().filter(|s| s.stock > 0).collect(),
    })
}

/// GET /api/admin/products - Every product, including inactive ones.
pub async fn admin_list_products(State(state): State<AppState>) -> ApiResult<Vec<Product>> {
    success(state.repo.list_all_products().await?)
}

/// POST /api/products - Create a product.
pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<CreateProductRequest>,
) -> ApiResult<Product> {
    validate_product_fields(
        &request.name,
        &request.category,
        request.price_cents,
        request.compare_at_cents,
    )
    .map_err(AppError::Validation)?;
    let sizes = parse_size_inputs(&request.sizes).map_err(AppError::Validation)?;

    let product = state
        .repo
        .create_product(&NewProduct::from_request(&request, sizes))
        .await?;
    reindex_product(&state, &product).await;

    success(product)
}

/// PUT /api/products/{id} - Update a product.
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateProductRequest>,
) -> ApiResult<Product> {
    let sizes = request
        .sizes
        .as_deref()
        .map(parse_size_inputs)
        .transpose()
        .map_err(AppError::Validation)?;

    let product = state.repo.update_product(&id, &request, sizes).await?;
    reindex_product(&state, &product).await;

    success(product)
}

/// DELETE /api/products/{id} - Delete a product.
pub async fn delete_product(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    state.repo.delete_product(&id).await?;

    if let Err(e) = state.search.remove_product(&id).await {
        tracing::warn!("Failed to remove product from index: {}", e);
    }

    success(())
}

/// PUT /api/products/{id}/stock - Replace stock levels.
pub async fn set_product_stock(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetStockRequest>,
) -> ApiResult<Product> {
    let sizes = parse_size_inputs(&request.sizes).map_err(AppError::Validation)?;
    success(state.repo.set_product_stock(&id, &sizes).await?)
}
