//! Admin-only user management and dashboard endpoints.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::{success, ApiResult};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{AdminUpdateUserRequest, Role, StoreStats, User};
use crate::AppState;

/// GET /api/admin/users - List all accounts.
pub async fn admin_list_users(State(state): State<AppState>) -> ApiResult<Vec<User>> {
    success(state.repo.list_users().await?)
}

/// PUT /api/admin/users/{id} - Edit an account's name, phone or role.
pub async fn admin_update_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(request): Json<AdminUpdateUserRequest>,
) -> ApiResult<User> {
    let target = state
        .repo
        .get_user(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

    let demoting = target.role == Role::Admin && request.role == Some(Role::Customer);
    if demoting && target.id == current.id {
        return Err(AppError::Forbidden(
            "You cannot remove your own admin role".to_string(),
        ));
    }

    success(state.repo.update_user(&id, &request).await?)
}

/// DELETE /api/admin/users/{id} - Delete an account.
pub async fn admin_delete_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    if id == current.id {
        return Err(AppError::Forbidden(
            "You cannot delete your own account".to_string(),
        ));
    }

    state.repo.delete_user(&id).await?;
    success(())
}

/// GET /api/admin/stats - Dashboard figures.
pub async fn admin_stats(State(state): State<AppState>) -> ApiResult<StoreStats> {
    success(state.repo.order_stats().await?)
}
