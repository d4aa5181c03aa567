//! Collection endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{reindex_products, success, ApiResult};
use crate::errors::AppError;
use crate::models::{
    Collection, CollectionDetail, CreateCollectionRequest, SetCollectionProductsRequest,
    UpdateCollectionRequest,
};
use crate::AppState;

/// GET /api/collections - List all collections.
pub async fn list_collections(State(state): State<AppState>) -> ApiResult<Vec<Collection>> {
    success(state.repo.list_collections().await?)
}

/// GET /api/collections/{idOrSlug} - A collection with its active products.
pub async fn get_collection(
    State(state): State<AppState>,
    Path(id_or_slug): Path<String>,
) -> ApiResult<CollectionDetail> {
    match state.repo.collection_detail(&id_or_slug, true).await? {
        Some(detail) => success(detail),
        None => Err(AppError::NotFound(format!("Collection {} not found", id_or_slug))),
    }
}

/// POST /api/collections - Create a collection.
pub async fn create_collection(
    State(state): State<AppState>,
    Json(request): Json<CreateCollectionRequest>,
) -> ApiResult<Collection> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Collection name is required".to_string()));
    }
    success(state.repo.create_collection(&request).await?)
}

/// PUT /api/collections/{id} - Update a collection.
pub async fn update_collection(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateCollectionRequest>,
) -> ApiResult<Collection> {
    let renamed = request.name.is_some();
    let collection = state.repo.update_collection(&id, &request).await?;

    // Collection names are part of each member's search document.
    if renamed {
        let members = member_ids(&state, &collection.id).await;
        reindex_products(&state, &members).await;
    }

    success(collection)
}

/// DELETE /api/collections/{id} - Delete a collection.
pub async fn delete_collection(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    let members = member_ids(&state, &id).await;
    state.repo.delete_collection(&id).await?;
    reindex_products(&state, &members).await;
    success(())
}

/// PUT /api/collections/{id}/products - Replace collection membership.
pub async fn set_collection_products(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetCollectionProductsRequest>,
) -> ApiResult<Collection> {
    let mut affected = member_ids(&state, &id).await;
    let collection = state
        .repo
        .set_collection_products(&id, &request.product_ids)
        .await?;

    for product_id in request.product_ids {
        if !affected.contains(&product_id) {
            affected.push(product_id);
        }
    }
    reindex_products(&state, &affected).await;

    success(collection)
}

async fn member_ids(state: &AppState, collection_id: &str) -> Vec<String> {
    match state.repo.collection_member_ids(collection_id).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::warn!("Failed to load members of collection {}: {}", collection_id, e);
            Vec::new()
        }
    }
}
