//! Sales (offers): discount records with optional scoping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a sale's `value` is interpreted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    /// `value` is a whole percentage, 1..=100
    Percentage,
    /// `value` is an amount in cents
    Fixed,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Percentage => "percentage",
            DiscountKind::Fixed => "fixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "percentage" => Some(DiscountKind::Percentage),
            "fixed" => Some(DiscountKind::Fixed),
            _ => None,
        }
    }
}

/// A discount, optionally limited to a collection, a date window, a minimum
/// order amount or a code the shopper must enter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub kind: DiscountKind,
    pub value: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_order_cents: Option<i64>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub version: i64,
}

/// Storefront view of a sale; the code itself stays private.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSale {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub kind: DiscountKind,
    pub value: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_order_cents: Option<i64>,
    pub requires_code: bool,
}

impl From<&Sale> for PublicSale {
    fn from(sale: &Sale) -> Self {
        Self {
            id: sale.id.clone(),
            name: sale.name.clone(),
            description: sale.description.clone(),
            kind: sale.kind,
            value: sale.value,
            collection_id: sale.collection_id.clone(),
            ends_at: sale.ends_at,
            min_order_cents: sale.min_order_cents,
            requires_code: sale.code.is_some(),
        }
    }
}

/// Request body for creating a sale.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSaleRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    pub kind: DiscountKind,
    pub value: i64,
    #[serde(default)]
    pub collection_id: Option<String>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub min_order_cents: Option<i64>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Request body for updating a sale.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSaleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub kind: Option<DiscountKind>,
    #[serde(default)]
    pub value: Option<i64>,
    #[serde(default)]
    pub collection_id: Option<String>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub min_order_cents: Option<i64>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Validate the numeric and date rules every stored sale must satisfy.
pub fn validate_sale_terms(
    kind: DiscountKind,
    value: i64,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    min_order_cents: Option<i64>,
) -> Result<(), String> {
    match kind {
        DiscountKind::Percentage if !(1..=100).contains(&value) => {
            return Err("Percentage discount must be between 1 and 100".to_string())
        }
        DiscountKind::Fixed if value <= 0 => {
            return Err("Fixed discount must be positive".to_string())
        }
        _ => {}
    }
    if let (Some(start), Some(end)) = (starts_at, ends_at) {
        if end <= start {
            return Err("Sale must end after it starts".to_string());
        }
    }
    if min_order_cents.is_some_and(|m| m < 0) {
        return Err("Minimum order amount cannot be negative".to_string());
    }
    Ok(())
}
