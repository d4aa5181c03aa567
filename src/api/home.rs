use axum::extract::State;
use chrono::Utc;
use serde::Serialize;

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::{
    Product, ProductFilter, ProductSort, PublicSale, HOMEPAGE_FEATURED, HOMEPAGE_NEW_ARRIVALS,
};
use crate::AppState;

/// Products shown when no new-arrivals list is curated.
const NEW_ARRIVALS_FALLBACK: i64 = 8;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomePage {
    pub featured: Vec<Product>,
    pub new_arrivals: Vec<Product>,
    pub sales: Vec<PublicSale>,
}

/// GET /api/home - Homepage curation plus live sales.
pub async fn home(State(state): State<AppState>) -> ApiResult<HomePage> {
    let featured = curated(&state, HOMEPAGE_FEATURED).await?;

    let mut new_arrivals = curated(&state, HOMEPAGE_NEW_ARRIVALS).await?;
    if new_arrivals.is_empty() {
        new_arrivals = state
            .repo
            .list_products(&ProductFilter {
                active_only: true,
                sort: ProductSort::Newest,
                limit: NEW_ARRIVALS_FALLBACK,
                ..Default::default()
            })
            .await?
            .items;
    }

    let sales = state.repo.list_live_sales(Utc::now()).await?;

    success(HomePage {
        featured,
        new_arrivals,
        sales: sales.iter().map(PublicSale::from).collect(),
    })
}

/// Active products named by a curation setting, in the curated order.
async fn curated(state: &AppState, key: &str) -> Result<Vec<Product>, AppError> {
    let ids = match state.repo.get_setting(key).await? {
        Some(setting) => setting.string_list(),
        None => return Ok(Vec::new()),
    };
    let products = state.repo.get_products_by_ids(&ids).await?;
    Ok(products.into_iter().filter(|p| p.active).collect())
}
