//! REST API module.
//!
//! Contains all API routes and handlers following the storefront contract.

mod account;
mod admin;
mod auth;
mod cart;
mod collections;
mod contact;
mod home;
mod orders;
mod products;
mod sales;
mod settings;

pub use account::*;
pub use admin::*;
pub use auth::*;
pub use cart::*;
pub use collections::*;
pub use contact::*;
pub use home::*;
pub use orders::*;
pub use products::*;
pub use sales::*;
pub use settings::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::Product;
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Bring the search index in line with a product after a write.
///
/// The write has already committed, so index failures are only logged.
async fn reindex_product(state: &AppState, product: &Product) {
    let collections = state.repo.list_collections().await.unwrap_or_default();
    if let Err(e) = state.search.index_product(product, &collections).await {
        tracing::warn!("Failed to index product {}: {}", product.id, e);
    }
}

/// Re-index several products by id, e.g. after collection membership changed.
async fn reindex_products(state: &AppState, ids: &[String]) {
    match state.repo.get_products_by_ids(ids).await {
        Ok(products) => {
            for product in &products {
                reindex_product(state, product).await;
            }
        }
        Err(e) => tracing::warn!("Failed to load products for re-indexing: {}", e),
    }
}
