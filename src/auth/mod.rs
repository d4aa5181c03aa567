//! Authentication and authorization.
//!
//! Shoppers and admins authenticate with a bearer session token. Automation
//! may instead present the configured service key in `x-api-key`, which is
//! compared in constant time and grants admin access.

pub mod password;
pub mod token;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::models::Role;
use crate::AppState;

/// Header name for the service key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The principal a request runs as, placed in request extensions.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub role: Role,
    /// Authenticated with the service key rather than as a stored user.
    pub is_service: bool,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Reject principals that do not correspond to a stored account.
    pub fn require_account(&self) -> Result<&str, AppError> {
        if self.is_service {
            Err(AppError::Forbidden(
                "This action needs a signed-in customer account".to_string(),
            ))
        } else {
            Ok(&self.id)
        }
    }

    fn service() -> Self {
        Self {
            id: "service".to_string(),
            email: "service@localhost".to_string(),
            role: Role::Admin,
            is_service: true,
        }
    }
}

/// Resolve the caller and store a [`CurrentUser`] in the request extensions.
///
/// The role is re-read from the database on every request so that demoting
/// or deleting an account takes effect before its token expires.
pub async fn require_user(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let credentials = Credentials::from_headers(request.headers());
    match resolve_user(&state, credentials).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Reject non-admin callers. Must run after [`require_user`].
pub async fn require_admin(request: Request, next: Next) -> Response {
    let caller = request
        .extensions()
        .get::<CurrentUser>()
        .map(|user| (user.is_admin(), user.id.clone()));

    match caller {
        Some((true, _)) => next.run(request).await,
        Some((false, id)) => {
            tracing::warn!("User {} attempted an admin action", id);
            AppError::Forbidden("Admin access required".to_string()).into_response()
        }
        None => AppError::Unauthorized("Missing or invalid credentials".to_string()).into_response(),
    }
}

/// Credentials copied out of the request headers.
#[derive(Debug, Default)]
struct Credentials {
    api_key: Option<String>,
    bearer: Option<String>,
}

impl Credentials {
    fn from_headers(headers: &header::HeaderMap) -> Self {
        let api_key = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Self { api_key, bearer }
    }
}

async fn resolve_user(state: &AppState, credentials: Credentials) -> Result<CurrentUser, AppError> {
    if let (Some(expected), Some(provided)) = (state.config.api_key.as_deref(), &credentials.api_key) {
        return if constant_time_compare(provided, expected) {
            Ok(CurrentUser::service())
        } else {
            Err(AppError::Unauthorized("Invalid API key".to_string()))
        };
    }

    let bearer = credentials
        .bearer
        .ok_or_else(|| AppError::Unauthorized("Missing or invalid credentials".to_string()))?;

    let claims = token::verify(&bearer, &state.config.jwt_secret)?;

    let user = state
        .repo
        .get_user(&claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".to_string()))?;

    Ok(CurrentUser {
        id: user.id,
        email: user.email,
        role: user.role,
        is_service: false,
    })
}

/// Perform constant-time string comparison.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
