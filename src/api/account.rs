use axum::{extract::State, Extension, Json};

use super::{success, ApiResult};
use crate::auth::{password, CurrentUser};
use crate::errors::AppError;
use crate::models::{
    AdminUpdateUserRequest, ChangePasswordRequest, UpdateProfileRequest, User, MIN_PASSWORD_LEN,
};
use crate::AppState;

/// PUT /api/account/profile - Update the caller's name and phone.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<User> {
    let id = current.require_account()?;
    let changes = AdminUpdateUserRequest {
        name: request.name,
        phone: request.phone,
        role: None,
    };
    success(state.repo.update_user(id, &changes).await?)
}

/// PUT /api/account/password - Change the caller's password.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<ChangePasswordRequest>,
) -> ApiResult<()> {
    let id = current.require_account()?;

    let stored = state
        .repo
        .get_password_hash(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".to_string()))?;
    if !password::verify_password(&request.current_password, &stored) {
        return Err(AppError::Forbidden("Current password is incorrect".to_string()));
    }
    if request.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let hash = password::hash_password(&request.new_password)?;
    state.repo.set_password(id, &hash).await?;
    tracing::info!("Password changed for user {}", id);

    success(())
}
