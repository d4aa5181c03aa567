//! Cart pricing: sale eligibility, discount calculation and allocation.
//!
//! Everything here is pure; callers load products and sales and pass them in.
//! Amounts are integer cents and discounts round down.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{DiscountKind, OrderItem, Sale};
use crate::sizing::Size;

/// A priced cart line before discounts.
#[derive(Debug, Clone)]
pub struct CartLine {
    pub product_id: String,
    pub product_name: String,
    pub collection_ids: Vec<String>,
    pub size: Size,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// Stock on hand for the size, reported back to the shopper.
    pub available: Option<i64>,
}

impl CartLine {
    /// Saturates instead of overflowing; carts are checked with
    /// [`checked_subtotal`] before pricing.
    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents.saturating_mul(self.quantity)
    }

    fn eligible_for(&self, sale: &Sale) -> bool {
        match &sale.collection_id {
            Some(collection) => self.collection_ids.iter().any(|c| c == collection),
            None => true,
        }
    }
}

/// A line after discounts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotedLine {
    pub product_id: String,
    pub product_name: String,
    pub size: Size,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    pub discount_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<i64>,
}

impl From<QuotedLine> for OrderItem {
    fn from(line: QuotedLine) -> Self {
        OrderItem {
            product_id: line.product_id,
            product_name: line.product_name,
            size: line.size,
            quantity: line.quantity,
            unit_price_cents: line.unit_price_cents,
            line_total_cents: line.line_total_cents,
            discount_cents: line.discount_cents,
        }
    }
}

/// The sale that won, if any.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedSale {
    pub sale_id: String,
    pub name: String,
    pub discount_cents: i64,
}

/// Flat-rate shipping with an optional free-shipping threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShippingPolicy {
    pub flat_cents: i64,
    pub free_over_cents: Option<i64>,
}

impl ShippingPolicy {
    /// Shipping owed on a cart whose discounted subtotal is `net_cents`.
    pub fn charge(&self, net_cents: i64, empty_cart: bool) -> i64 {
        if empty_cart {
            return 0;
        }
        match self.free_over_cents {
            Some(threshold) if net_cents >= threshold => 0,
            _ => self.flat_cents.max(0),
        }
    }
}

/// Fully priced cart.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub lines: Vec<QuotedLine>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_sale: Option<AppliedSale>,
}

/// Active and inside its date window. The window start is inclusive, the end exclusive.
pub fn sale_is_live(sale: &Sale, now: DateTime<Utc>) -> bool {
    sale.active
        && sale.starts_at.is_none_or(|start| start <= now)
        && sale.ends_at.is_none_or(|end| now < end)
}

fn code_matches(sale: &Sale, code: Option<&str>) -> bool {
    match &sale.code {
        None => true,
        Some(required) => code.is_some_and(|given| given.trim().eq_ignore_ascii_case(required.trim())),
    }
}

/// Discount `sale` would grant on `lines`, or `None` if it does not apply.
pub fn sale_discount(
    sale: &Sale,
    lines: &[CartLine],
    now: DateTime<Utc>,
    code: Option<&str>,
) -> Option<i64> {
    if !sale_is_live(sale, now) || !code_matches(sale, code) {
        return None;
    }

    let subtotal = saturating_total(lines.iter());
    if sale.min_order_cents.is_some_and(|min| subtotal < min) {
        return None;
    }

    let eligible = saturating_total(lines.iter().filter(|l| l.eligible_for(sale)));
    if eligible <= 0 {
        return None;
    }

    let discount = match sale.kind {
        DiscountKind::Percentage => {
            (i128::from(eligible) * i128::from(sale.value.clamp(0, 100)) / 100) as i64
        }
        DiscountKind::Fixed => sale.value.max(0).min(eligible),
    };
    (discount > 0).then_some(discount)
}

/// Price `lines`, applying the single most valuable sale.
pub fn quote(
    lines: &[CartLine],
    sales: &[Sale],
    now: DateTime<Utc>,
    code: Option<&str>,
    shipping: ShippingPolicy,
) -> Quote {
    let subtotal = saturating_total(lines.iter());

    let mut best: Option<(&Sale, i64)> = None;
    for sale in sales {
        if let Some(discount) = sale_discount(sale, lines, now, code) {
            if best.is_none_or(|(_, current)| discount > current) {
                best = Some((sale, discount));
            }
        }
    }

    let allocations = match best {
        Some((sale, discount)) => allocate(lines, sale, discount),
        None => vec![0; lines.len()],
    };

    let quoted: Vec<QuotedLine> = lines
        .iter()
        .zip(allocations)
        .map(|(line, discount_cents)| QuotedLine {
            product_id: line.product_id.clone(),
            product_name: line.product_name.clone(),
            size: line.size,
            quantity: line.quantity,
            unit_price_cents: line.unit_price_cents,
            line_total_cents: line.line_total_cents(),
            discount_cents,
            available: line.available,
        })
        .collect();

    let discount = best.map(|(_, d)| d).unwrap_or(0);
    let net = subtotal - discount;
    let shipping_cents = shipping.charge(net, lines.is_empty());

    Quote {
        lines: quoted,
        subtotal_cents: subtotal,
        discount_cents: discount,
        shipping_cents,
        total_cents: net.saturating_add(shipping_cents).max(0),
        applied_sale: best.map(|(sale, discount_cents)| AppliedSale {
            sale_id: sale.id.clone(),
            name: sale.name.clone(),
            discount_cents,
        }),
    }
}

/// Cart subtotal, or `None` if a line total or the sum overflows.
pub fn checked_subtotal(lines: &[CartLine]) -> Option<i64> {
    lines.iter().try_fold(0i64, |acc, line| {
        line.unit_price_cents
            .checked_mul(line.quantity)
            .and_then(|total| acc.checked_add(total))
    })
}

fn saturating_total<'a>(lines: impl Iterator<Item = &'a CartLine>) -> i64 {
    lines
        .map(CartLine::line_total_cents)
        .fold(0, i64::saturating_add)
}

/// Spread `discount` over the sale's eligible lines in proportion to their
/// totals. Rounding leftovers go to the last eligible lines first, never
/// pushing a line's discount above its total.
fn allocate(lines: &[CartLine], sale: &Sale, discount: i64) -> Vec<i64> {
    let mut out = vec![0i64; lines.len()];
    let eligible: Vec<usize> = (0..lines.len())
        .filter(|&i| lines[i].eligible_for(sale))
        .collect();
    let eligible_total = saturating_total(eligible.iter().map(|&i| &lines[i]));
    if eligible_total <= 0 {
        return out;
    }

    for &i in &eligible {
        let share = i128::from(discount) * i128::from(lines[i].line_total_cents())
            / i128::from(eligible_total);
        out[i] = share as i64;
    }

    let mut remaining = discount - out.iter().sum::<i64>();
    for &i in eligible.iter().rev() {
        if remaining == 0 {
            break;
        }
        let room = lines[i].line_total_cents() - out[i];
        let take = room.min(remaining);
        out[i] += take;
        remaining -= take;
    }

    out
}
