//! Checkout, order history and the order status lifecycle.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use super::products::fetch_product;
use super::repository::now_rfc3339;
use super::sales::fetch_live_sales;
use super::Repository;
use crate::errors::AppError;
use crate::models::{
    check_version, order_number, CartItemRequest, CreateOrderRequest, Order, OrderItem, OrderStatus,
    ShippingAddress, StoreStats,
};
use crate::pricing::{self, CartLine, Quote, ShippingPolicy};
use crate::sizing::{match_size, Size};

const ORDER_COLUMNS: &str = "id, order_number, user_id, customer_email, subtotal_cents, discount_cents, \
     shipping_cents, total_cents, sale_id, status, shipping_address, notes, created_at, updated_at, version";

/// Stock at or below this level shows up on the dashboard.
pub const LOW_STOCK_THRESHOLD: i64 = 3;

/// Largest quantity accepted for one cart line.
pub const MAX_LINE_QUANTITY: i64 = 100;

/// Who is placing an order.
#[derive(Debug, Clone)]
pub struct Customer {
    pub user_id: Option<String>,
    pub email: String,
}

impl Repository {
    /// Price a cart against the sales live at `now` without reserving stock.
    pub async fn quote_cart(
        &self,
        items: &[CartItemRequest],
        code: Option<&str>,
        shipping: ShippingPolicy,
        now: DateTime<Utc>,
    ) -> Result<Quote, AppError> {
        let mut conn = self.pool.acquire().await?;
        let lines = cart_lines(&mut conn, items).await?;
        let sales = fetch_live_sales(&mut conn, now).await?;
        Ok(pricing::quote(&lines, &sales, now, code, shipping))
    }

    /// Place an order.
    ///
    /// Item validation, stock decrements, pricing and the inserts share one
    /// transaction; if any line is short on stock nothing is written.
    pub async fn create_order(
        &self,
        customer: &Customer,
        request: &CreateOrderRequest,
        shipping: ShippingPolicy,
        now: DateTime<Utc>,
    ) -> Result<Order, AppError> {
        if request.items.is_empty() {
            return Err(AppError::Validation(
                "An order needs at least one item".to_string(),
            ));
        }
        request
            .shipping_address
            .validate()
            .map_err(AppError::Validation)?;

        let mut tx = self.pool.begin().await?;

        let lines = cart_lines(&mut tx, &request.items).await?;
        for line in &lines {
            take_stock(&mut tx, line).await?;
        }

        let sales = fetch_live_sales(&mut tx, now).await?;
        let quote = pricing::quote(
            &lines,
            &sales,
            now,
            request.code.as_deref(),
            shipping,
        );

        let uuid = uuid::Uuid::new_v4();
        let created_at = now.to_rfc3339();
        let notes = request
            .notes
            .as_ref()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let order = Order {
            id: uuid.to_string(),
            order_number: order_number(now, &uuid),
            user_id: customer.user_id.clone(),
            customer_email: customer.email.clone(),
            subtotal_cents: quote.subtotal_cents,
            discount_cents: quote.discount_cents,
            shipping_cents: quote.shipping_cents,
            total_cents: quote.total_cents,
            sale_id: quote.applied_sale.as_ref().map(|s| s.sale_id.clone()),
            items: quote.lines.into_iter().map(OrderItem::from).collect(),
            status: OrderStatus::Pending,
            shipping_address: request.shipping_address.clone(),
            notes,
            created_at: created_at.clone(),
            updated_at: created_at,
            version: 1,
        };

        sqlx::query(&format!(
            "INSERT INTO orders ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ORDER_COLUMNS
        ))
        .bind(&order.id)
        .bind(&order.order_number)
        .bind(&order.user_id)
        .bind(&order.customer_email)
        .bind(order.subtotal_cents)
        .bind(order.discount_cents)
        .bind(order.shipping_cents)
        .bind(order.total_cents)
        .bind(&order.sale_id)
        .bind(order.status.as_str())
        .bind(serde_json::to_string(&order.shipping_address)?)
        .bind(&order.notes)
        .bind(&order.created_at)
        .bind(&order.updated_at)
        .bind(order.version)
        .execute(&mut *tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (order_id, position, product_id, product_name, size, quantity, unit_price_cents, line_total_cents, discount_cents) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&order.id)
            .bind(position as i64)
            .bind(&item.product_id)
            .bind(&item.product_name)
            .bind(item.size.as_str())
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.line_total_cents)
            .bind(item.discount_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            "Order {} placed: {} items, total {} cents",
            order.order_number,
            order.items.len(),
            order.total_cents
        );
        Ok(order)
    }

    /// Orders, newest first, optionally for one user and/or one status.
    pub async fn list_orders(
        &self,
        user_id: Option<&str>,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, AppError> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM orders WHERE 1 = 1",
            ORDER_COLUMNS
        ));
        if let Some(user_id) = user_id {
            query.push(" AND user_id = ").push_bind(user_id.to_string());
        }
        if let Some(status) = status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY created_at DESC, order_number DESC");

        let mut conn = self.pool.acquire().await?;
        let rows = query.build().fetch_all(&mut *conn).await?;
        hydrate_orders(&mut conn, rows).await
    }

    pub async fn get_order(&self, id: &str) -> Result<Option<Order>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, id).await
    }

    /// Move an order to `next`, restoring stock when the new status
    /// releases it.
    pub async fn update_order_status(
        &self,
        id: &str,
        next: OrderStatus,
        expected_version: Option<i64>,
    ) -> Result<Order, AppError> {
        let mut tx = self.pool.begin().await?;

        let existing = fetch_order(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", id)))?;
        check_version("Order", expected_version, existing.version)?;

        if !existing.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: existing.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }

        let now = now_rfc3339();
        let result = sqlx::query(
            "UPDATE orders SET status = ?, updated_at = ?, version = version + 1 WHERE id = ? AND version = ?",
        )
        .bind(next.as_str())
        .bind(&now)
        .bind(id)
        .bind(existing.version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::VersionMismatch {
                message: "Concurrent modification detected".to_string(),
                current_version: existing.version,
            });
        }

        if next.releases_stock() {
            for item in &existing.items {
                restore_stock(&mut tx, item).await?;
            }
        }

        tx.commit().await?;

        tracing::info!(
            "Order {} moved from {} to {}",
            existing.order_number,
            existing.status.as_str(),
            next.as_str()
        );

        Ok(Order {
            status: next,
            updated_at: now,
            version: existing.version + 1,
            ..existing
        })
    }

    /// Overwrite an order's stored totals.
    pub async fn update_order_totals(
        &self,
        id: &str,
        subtotal_cents: i64,
        total_cents: i64,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE orders SET subtotal_cents = ?, total_cents = ?, updated_at = ?, version = version + 1 WHERE id = ?",
        )
        .bind(subtotal_cents)
        .bind(total_cents)
        .bind(now_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Order {} not found", id)));
        }
        Ok(())
    }

    /// Dashboard figures.
    pub async fn order_stats(&self) -> Result<StoreStats, AppError> {
        let products = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(active), 0) AS active FROM products",
        )
        .fetch_one(&self.pool)
        .await?;

        let status_rows = sqlx::query(
            "SELECT status, COUNT(*) AS n, COALESCE(SUM(total_cents), 0) AS revenue FROM orders GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut orders_by_status: BTreeMap<String, i64> = OrderStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut revenue_cents = 0;
        for row in &status_rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            let revenue: i64 = row.get("revenue");
            if OrderStatus::parse(&status).is_some_and(|s| s.is_revenue()) {
                revenue_cents += revenue;
            }
            orders_by_status.insert(status, n);
        }

        let customers = sqlx::query("SELECT COUNT(*) AS n FROM users WHERE role = 'customer'")
            .fetch_one(&self.pool)
            .await?;
        let contact = sqlx::query("SELECT COUNT(*) AS n FROM contact_submissions WHERE resolved = 0")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            product_count: products.get("total"),
            active_product_count: products.get("active"),
            orders_by_status,
            revenue_cents,
            customer_count: customers.get("n"),
            open_contact_count: contact.get("n"),
            low_stock: self.low_stock(LOW_STOCK_THRESHOLD).await?,
        })
    }
}

/// Resolve cart items to priced lines against current products.
async fn cart_lines(
    conn: &mut SqliteConnection,
    items: &[CartItemRequest],
) -> Result<Vec<CartLine>, AppError> {
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        if !(1..=MAX_LINE_QUANTITY).contains(&item.quantity) {
            return Err(AppError::Validation(format!(
                "Quantity for product {} must be between 1 and {}",
                item.product_id, MAX_LINE_QUANTITY
            )));
        }

        let product = fetch_product(conn, &item.product_id)
            .await?
            .filter(|p| p.active)
            .ok_or_else(|| {
                AppError::Validation(format!("Product {} is not available", item.product_id))
            })?;

        let stocked = match_size(&item.size, &product.sizes).ok_or_else(|| {
            AppError::Validation(format!(
                "Size {} is not offered for {}",
                item.size, product.name
            ))
        })?;

        lines.push(CartLine {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            collection_ids: product.collection_ids.clone(),
            size: stocked.size,
            quantity: item.quantity,
            unit_price_cents: product.price_cents,
            available: Some(stocked.stock),
        });
    }

    if pricing::checked_subtotal(&lines).is_none() {
        return Err(AppError::Validation("Cart total is too large".to_string()));
    }
    Ok(lines)
}

async fn take_stock(conn: &mut SqliteConnection, line: &CartLine) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE product_sizes SET stock = stock - ? WHERE product_id = ? AND size = ? AND stock >= ?",
    )
    .bind(line.quantity)
    .bind(&line.product_id)
    .bind(line.size.as_str())
    .bind(line.quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let available: i64 = sqlx::query("SELECT stock FROM product_sizes WHERE product_id = ? AND size = ?")
            .bind(&line.product_id)
            .bind(line.size.as_str())
            .fetch_optional(&mut *conn)
            .await?
            .map(|r| r.get("stock"))
            .unwrap_or(0);
        return Err(AppError::InsufficientStock {
            product_id: line.product_id.clone(),
            size: line.size.as_str().to_string(),
            available,
        });
    }
    Ok(())
}

/// Put an item back on the shelf. Products deleted since the order are skipped.
async fn restore_stock(conn: &mut SqliteConnection, item: &OrderItem) -> Result<(), AppError> {
    let result = sqlx::query(
        "INSERT INTO product_sizes (product_id, size, stock) SELECT ?, ?, ? WHERE EXISTS (SELECT 1 FROM products WHERE id = ?) \
         ON CONFLICT(product_id, size) DO UPDATE SET stock = stock + excluded.stock",
    )
    .bind(&item.product_id)
    .bind(item.size.as_str())
    .bind(item.quantity)
    .bind(&item.product_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        tracing::warn!(
            "Product {} no longer exists; {} x {} not restocked",
            item.product_id,
            item.quantity,
            item.size.as_str()
        );
    }
    Ok(())
}

async fn fetch_order(conn: &mut SqliteConnection, id: &str) -> Result<Option<Order>, AppError> {
    let rows = sqlx::query(&format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS))
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(hydrate_orders(conn, rows).await?.into_iter().next())
}

async fn hydrate_orders(conn: &mut SqliteConnection, rows: Vec<SqliteRow>) -> Result<Vec<Order>, AppError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut items_query = QueryBuilder::<Sqlite>::new(
        "SELECT order_id, product_id, product_name, size, quantity, unit_price_cents, line_total_cents, discount_cents \
         FROM order_items WHERE order_id IN (",
    );
    let mut separated = items_query.separated(", ");
    for row in &rows {
        separated.push_bind(row.get::<String, _>("id"));
    }
    separated.push_unseparated(") ORDER BY order_id, position");
    let item_rows = items_query.build().fetch_all(&mut *conn).await?;

    let mut items: HashMap<String, Vec<OrderItem>> = HashMap::new();
    for row in &item_rows {
        let order_id: String = row.get("order_id");
        let label: String = row.get("size");
        let Some(size) = Size::parse(&label) else {
            tracing::warn!("Order {} has an item with unknown size {:?}", order_id, label);
            continue;
        };
        items.entry(order_id).or_default().push(OrderItem {
            product_id: row.get("product_id"),
            product_name: row.get("product_name"),
            size,
            quantity: row.get("quantity"),
            unit_price_cents: row.get("unit_price_cents"),
            line_total_cents: row.get("line_total_cents"),
            discount_cents: row.get("discount_cents"),
        });
    }

    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            let order_items = items.remove(&id).unwrap_or_default();
            order_from_row(row, order_items)
        })
        .collect()
}

fn order_from_row(row: &SqliteRow, items: Vec<OrderItem>) -> Result<Order, AppError> {
    let status: String = row.get("status");
    let status = OrderStatus::parse(&status)
        .ok_or_else(|| AppError::Internal(format!("Unknown order status {:?}", status)))?;
    let address: String = row.get("shipping_address");
    let shipping_address: ShippingAddress = serde_json::from_str(&address)?;

    Ok(Order {
        id: row.get("id"),
        order_number: row.get("order_number"),
        user_id: row.get("user_id"),
        customer_email: row.get("customer_email"),
        items,
        subtotal_cents: row.get("subtotal_cents"),
        discount_cents: row.get("discount_cents"),
        shipping_cents: row.get("shipping_cents"),
        total_cents: row.get("total_cents"),
        sale_id: row.get("sale_id"),
        status,
        shipping_address,
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    })
}
