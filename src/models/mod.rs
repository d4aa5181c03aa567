//! Data models for the storefront.
//!
//! JSON field names are camelCase to match the frontend's fetch payloads.

mod collection;
mod contact;
mod order;
mod product;
mod sale;
mod setting;
mod user;

pub use collection::*;
pub use contact::*;
pub use order::*;
pub use product::*;
pub use sale::*;
pub use setting::*;
pub use user::*;

/// Check an optimistic-concurrency expectation against the stored version.
pub fn check_version(
    entity: &str,
    expected: Option<i64>,
    current: i64,
) -> Result<(), crate::errors::AppError> {
    match expected {
        Some(expected) if expected != current => Err(crate::errors::AppError::VersionMismatch {
            message: format!(
                "{} version mismatch: expected {}, current {}",
                entity, expected, current
            ),
            current_version: current,
        }),
        _ => Ok(()),
    }
}

/// Loose e-mail shape check: something@something.tld with no whitespace.
pub fn looks_like_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

/// Derive a URL slug from a display name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("item");
    }
    slug
}
