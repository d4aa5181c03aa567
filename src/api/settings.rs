//! Site settings endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::{
    is_secret_setting, is_valid_setting_key, PutSettingRequest, SiteSetting, MIN_ADMIN_ACCESS_KEY_LEN,
};
use crate::AppState;

/// GET /api/settings/{key} - A public setting.
pub async fn get_setting(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<SiteSetting> {
    // Secret keys look exactly like missing ones.
    let setting = if is_secret_setting(&key) {
        None
    } else {
        state.repo.get_setting(&key).await?
    };
    match setting {
        Some(setting) => success(setting),
        None => Err(AppError::NotFound(format!("Setting {} not found", key))),
    }
}

/// GET /api/admin/settings - Every setting, secrets redacted.
pub async fn admin_list_settings(State(state): State<AppState>) -> ApiResult<Vec<SiteSetting>> {
    let settings = state.repo.list_settings().await?;
    success(settings.iter().map(SiteSetting::redacted).collect())
}

/// PUT /api/admin/settings/{key} - Create or replace a setting.
pub async fn admin_put_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<PutSettingRequest>,
) -> ApiResult<SiteSetting> {
    if !is_valid_setting_key(&key) {
        return Err(AppError::Validation(
            "Setting keys are 1-64 characters of a-z, 0-9 and _".to_string(),
        ));
    }
    let value = if is_secret_setting(&key) {
        let secret = request
            .value
            .as_str()
            .map(str::trim)
            .filter(|v| v.chars().count() >= MIN_ADMIN_ACCESS_KEY_LEN)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "The admin access key must be a string of at least {} characters",
                    MIN_ADMIN_ACCESS_KEY_LEN
                ))
            })?;
        serde_json::Value::String(secret.to_string())
    } else {
        request.value
    };

    let setting = state.repo.put_setting(&key, &value).await?;
    success(setting.redacted())
}

/// DELETE /api/admin/settings/{key} - Remove a setting.
pub async fn admin_delete_setting(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<()> {
    state.repo.delete_setting(&key).await?;
    success(())
}
