//! Contact form submissions.

use serde::{Deserialize, Serialize};

/// Longest accepted contact message.
pub const MAX_CONTACT_MESSAGE_LEN: usize = 5000;

/// A message sent through the storefront contact form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSubmission {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
    pub resolved: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveContactRequest {
    pub resolved: bool,
}
