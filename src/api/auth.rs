//! Account authentication endpoints.

use axum::{extract::State, Extension, Json};

use super::{success, ApiResult};
use crate::auth::{constant_time_compare, password, token, CurrentUser};
use crate::errors::AppError;
use crate::models::{
    looks_like_email, normalize_email, AdminAccessRequest, AuthResponse, LoginRequest,
    RegisterRequest, Role, User, ADMIN_ACCESS_KEY, MIN_PASSWORD_LEN,
};
use crate::AppState;

const BAD_CREDENTIALS: &str = "Invalid email or password";

fn session(state: &AppState, user: User) -> Result<AuthResponse, AppError> {
    let (token, expires_at) = token::issue(&user, &state.config.jwt_secret, state.config.token_ttl_hours)?;
    Ok(AuthResponse {
        token,
        expires_at: expires_at.to_rfc3339(),
        user,
    })
}

/// POST /api/auth/register - Create a customer account and sign in.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<AuthResponse> {
    let email = normalize_email(&request.email);
    if !looks_like_email(&email) {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }

    let hash = password::hash_password(&request.password)?;
    let user = state
        .repo
        .create_user(&email, &request.name, request.phone.as_ref(), &hash, Role::Customer)
        .await?;

    success(session(&state, user)?)
}

/// POST /api/auth/login - Exchange credentials for a session token.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<AuthResponse> {
    let email = normalize_email(&request.email);
    let Some(credentials) = state.repo.find_user_by_email(&email).await? else {
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.to_string()));
    };
    if !password::verify_password(&request.password, &credentials.password_hash) {
        tracing::info!("Failed login for {}", credentials.user.id);
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.to_string()));
    }

    success(session(&state, credentials.user)?)
}

/// GET /api/auth/me - The signed-in account.
pub async fn me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<User> {
    let id = current.require_account()?;
    let user = state
        .repo
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".to_string()))?;
    success(user)
}

/// POST /api/auth/admin-access - Promote the caller with the admin access key.
pub async fn admin_access(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<AdminAccessRequest>,
) -> ApiResult<AuthResponse> {
    let id = current.require_account()?;

    let stored = state.repo.get_setting(ADMIN_ACCESS_KEY).await?;
    let expected = stored.as_ref().and_then(|s| s.value.as_str());
    let granted = match expected {
        Some(expected) => constant_time_compare(request.key.trim(), expected),
        None => false,
    };
    if !granted {
        tracing::warn!("Rejected admin access attempt by {}", id);
        return Err(AppError::Forbidden("Invalid admin access key".to_string()));
    }

    let user = state
        .repo
        .update_user(
            id,
            &crate::models::AdminUpdateUserRequest {
                role: Some(Role::Admin),
                ..Default::default()
            },
        )
        .await?;
    tracing::info!("User {} granted admin access", user.id);

    success(session(&state, user)?)
}
