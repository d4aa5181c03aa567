//! Checkout and order endpoints.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;

use super::{success, ApiResult};
use crate::auth::CurrentUser;
use crate::db::Customer;
use crate::errors::AppError;
use crate::models::{CreateOrderRequest, Order, OrderStatus, UpdateOrderStatusRequest};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
}

/// POST /api/orders - Place an order for the signed-in customer.
pub async fn create_order(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<Order> {
    let user_id = current.require_account()?;
    let customer = Customer {
        user_id: Some(user_id.to_string()),
        email: current.email.clone(),
    };

    let order = state
        .repo
        .create_order(&customer, &request, state.config.shipping_policy(), Utc::now())
        .await?;
    success(order)
}

/// GET /api/orders - The caller's orders; admins see every order.
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<OrderListQuery>,
) -> ApiResult<Vec<Order>> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => Some(
            OrderStatus::parse(s)
                .ok_or_else(|| AppError::Validation(format!("Unknown order status: {}", s)))?,
        ),
        None => None,
    };

    let owner = if current.is_admin() {
        None
    } else {
        Some(current.id.as_str())
    };
    success(state.repo.list_orders(owner, status).await?)
}

/// GET /api/orders/{id} - One order the caller may see.
pub async fn get_order(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Order> {
    success(visible_order(&state, &current, &id).await?)
}

/// POST /api/orders/{id}/cancel - Cancel an order that has not started processing.
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Order> {
    let order = visible_order(&state, &current, &id).await?;
    if !order.status.customer_cancellable() {
        return Err(AppError::InvalidTransition {
            from: order.status.as_str().to_string(),
            to: OrderStatus::Cancelled.as_str().to_string(),
        });
    }

    let cancelled = state
        .repo
        .update_order_status(&order.id, OrderStatus::Cancelled, Some(order.version))
        .await?;
    success(cancelled)
}

/// PUT /api/orders/{id}/status - Move an order through its lifecycle.
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> ApiResult<Order> {
    let order = state
        .repo
        .update_order_status(&id, request.status, request.expected_version)
        .await?;
    success(order)
}

/// Customers only see their own orders; anything else looks missing.
async fn visible_order(state: &AppState, current: &CurrentUser, id: &str) -> Result<Order, AppError> {
    let order = state
        .repo
        .get_order(id)
        .await?
        .filter(|o| current.is_admin() || o.user_id.as_deref() == Some(current.id.as_str()))
        .ok_or_else(|| AppError::NotFound(format!("Order {} not found", id)))?;
    Ok(order)
}
