//! Key/value site settings.

use serde::{Deserialize, Serialize};

/// Setting holding the key that promotes a signed-in user to admin.
pub const ADMIN_ACCESS_KEY: &str = "admin_access_key";
/// Shortest admin access key accepted.
pub const MIN_ADMIN_ACCESS_KEY_LEN: usize = 12;
/// Curated list of product ids for the homepage hero grid.
pub const HOMEPAGE_FEATURED: &str = "homepage_featured";
/// Curated list of product ids for the homepage "new arrivals" strip.
pub const HOMEPAGE_NEW_ARRIVALS: &str = "homepage_new_arrivals";

/// Settings that must never be returned by a read endpoint.
pub fn is_secret_setting(key: &str) -> bool {
    key == ADMIN_ACCESS_KEY
}

/// Keys are 1-64 characters of lowercase letters, digits and underscores.
pub fn is_valid_setting_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 64
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// A stored setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSetting {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: String,
}

impl SiteSetting {
    /// Copy with the value masked if the key is secret.
    pub fn redacted(&self) -> Self {
        if is_secret_setting(&self.key) {
            Self {
                value: serde_json::Value::String("********".to_string()),
                ..self.clone()
            }
        } else {
            self.clone()
        }
    }

    /// Interpret the value as a list of string ids; anything else is empty.
    pub fn string_list(&self) -> Vec<String> {
        self.value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PutSettingRequest {
    pub value: serde_json::Value,
}
