use axum::{extract::State, Json};
use chrono::Utc;

use super::{success, ApiResult};
use crate::models::CartQuoteRequest;
use crate::pricing::Quote;
use crate::AppState;

/// POST /api/cart/quote - Price a cart with the best live sale.
pub async fn quote_cart(
    State(state): State<AppState>,
    Json(request): Json<CartQuoteRequest>,
) -> ApiResult<Quote> {
    let quote = state
        .repo
        .quote_cart(
            &request.items,
            request.code.as_deref(),
            state.config.shipping_policy(),
            Utc::now(),
        )
        .await?;
    success(quote)
}
