//! Contact form endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::{
    looks_like_email, ContactRequest, ContactSubmission, ResolveContactRequest,
    MAX_CONTACT_MESSAGE_LEN,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ContactListQuery {
    #[serde(default)]
    pub unresolved: bool,
}

/// POST /api/contact/submit - Store a contact form message.
pub async fn submit_contact(
    State(state): State<AppState>,
    Json(request): Json<ContactRequest>,
) -> ApiResult<ContactSubmission> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    if !looks_like_email(request.email.trim()) {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }
    let message = request.message.trim();
    if message.is_empty() {
        return Err(AppError::Validation("Message is required".to_string()));
    }
    if message.chars().count() > MAX_CONTACT_MESSAGE_LEN {
        return Err(AppError::Validation(format!(
            "Message must be at most {} characters",
            MAX_CONTACT_MESSAGE_LEN
        )));
    }

    success(state.repo.create_contact(&request).await?)
}

/// GET /api/admin/contact - Contact submissions, newest first.
pub async fn admin_list_contact(
    State(state): State<AppState>,
    Query(query): Query<ContactListQuery>,
) -> ApiResult<Vec<ContactSubmission>> {
    success(state.repo.list_contact(query.unresolved).await?)
}

/// PUT /api/admin/contact/{id} - Mark a submission resolved or open.
pub async fn admin_resolve_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ResolveContactRequest>,
) -> ApiResult<ContactSubmission> {
    success(state.repo.set_contact_resolved(&id, request.resolved).await?)
}

/// DELETE /api/admin/contact/{id} - Delete a submission.
pub async fn admin_delete_contact(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    state.repo.delete_contact(&id).await?;
    success(())
}
