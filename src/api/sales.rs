//! Sale (offer) endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use super::{success, ApiResult};
use crate::models::{CreateSaleRequest, PublicSale, Sale, UpdateSaleRequest};
use crate::AppState;

/// GET /api/sales - Sales live right now, codes withheld.
pub async fn list_live_sales(State(state): State<AppState>) -> ApiResult<Vec<PublicSale>> {
    let sales = state.repo.list_live_sales(Utc::now()).await?;
    success(sales.iter().map(PublicSale::from).collect())
}

/// GET /api/admin/sales - Every sale, with codes.
pub async fn admin_list_sales(State(state): State<AppState>) -> ApiResult<Vec<Sale>> {
    success(state.repo.list_sales().await?)
}

/// POST /api/sales - Create a sale.
pub async fn create_sale(
    State(state): State<AppState>,
    Json(request): Json<CreateSaleRequest>,
) -> ApiResult<Sale> {
    success(state.repo.create_sale(&request).await?)
}

/// PUT /api/sales/{id} - Update a sale.
pub async fn update_sale(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateSaleRequest>,
) -> ApiResult<Sale> {
    success(state.repo.update_sale(&id, &request).await?)
}

/// DELETE /api/sales/{id} - Delete a sale.
pub async fn delete_sale(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    state.repo.delete_sale(&id).await?;
    success(())
}
