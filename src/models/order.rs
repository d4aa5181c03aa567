//! Orders and the order status lifecycle.

use serde::{Deserialize, Serialize};

use crate::sizing::Size;

/// Order status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Returned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        OrderStatus::ALL.into_iter().find(|st| st.as_str() == s)
    }

    /// Whether an order may move from `self` to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Processing)
                | (Confirmed, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
                | (Delivered, Returned)
        )
    }

    /// Entering this status puts the order's items back on the shelf.
    pub fn releases_stock(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Returned)
    }

    /// Customers may cancel their own order only before it is being processed.
    pub fn customer_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    /// Counted towards revenue.
    pub fn is_revenue(&self) -> bool {
        !self.releases_stock()
    }
}

/// Delivery address captured at checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub full_name: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ShippingAddress {
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("Full name", &self.full_name),
            ("Address line 1", &self.line1),
            ("City", &self.city),
            ("Postal code", &self.postal_code),
            ("Country", &self.country),
        ];
        for (label, value) in required {
            if value.trim().is_empty() {
                return Err(format!("{} is required", label));
            }
        }
        Ok(())
    }
}

/// One purchased line, with the product name and price captured at order time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub product_name: String,
    pub size: Size,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    pub discount_cents: i64,
}

/// A placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub customer_email: String,
    pub items: Vec<OrderItem>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_id: Option<String>,
    pub status: OrderStatus,
    pub shipping_address: ShippingAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub version: i64,
}

/// A cart line as submitted by the storefront.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemRequest {
    pub product_id: String,
    pub size: String,
    pub quantity: i64,
}

/// Request body for pricing a cart.
#[derive(Debug, Clone, Deserialize)]
pub struct CartQuoteRequest {
    pub items: Vec<CartItemRequest>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Request body for checkout.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub items: Vec<CartItemRequest>,
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Request body for an admin status change.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Dashboard figures.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub product_count: i64,
    pub active_product_count: i64,
    pub orders_by_status: std::collections::BTreeMap<String, i64>,
    pub revenue_cents: i64,
    pub customer_count: i64,
    pub open_contact_count: i64,
    pub low_stock: Vec<LowStockEntry>,
}

/// A product size that is running out.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockEntry {
    pub product_id: String,
    pub name: String,
    pub size: Size,
    pub stock: i64,
}

/// Human-facing order reference, e.g. `ORD-20261016-3F9A1C2B7D05`.
///
/// The suffix is the first 48 random bits of the order id.
pub fn order_number(date: chrono::DateTime<chrono::Utc>, id: &uuid::Uuid) -> String {
    let suffix = id.simple().to_string()[..12].to_ascii_uppercase();
    format!("ORD-{}-{}", date.format("%Y%m%d"), suffix)
}
