//! Garment Store Backend
//!
//! REST backend for a traditional garment storefront and its admin
//! dashboard, with SQLite persistence and Tantivy product search.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod maintenance;
pub mod models;
pub mod pricing;
pub mod search;
pub mod sizing;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use db::Repository;
use search::SearchIndex;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub search: Arc<SearchIndex>,
    pub config: Arc<Config>,
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Storefront routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/register", post(api::register))
        .route("/auth/login", post(api::login))
        .route("/products", get(api::list_products))
        .route("/products/search", get(api::search_products))
        .route("/products/{id}", get(api::get_product))
        .route("/products/{id}/size-recommendation", get(api::size_recommendation))
        .route("/collections", get(api::list_collections))
        .route("/collections/{id}", get(api::get_collection))
        .route("/sales", get(api::list_live_sales))
        .route("/home", get(api::home))
        .route("/settings/{key}", get(api::get_setting))
        .route("/cart/quote", post(api::quote_cart))
        .route("/contact/submit", post(api::submit_contact));

    // Signed-in customer routes
    let user_routes = Router::new()
        .route("/auth/me", get(api::me))
        .route("/auth/admin-access", post(api::admin_access))
        .route("/orders", post(api::create_order).get(api::list_orders))
        .route("/orders/{id}", get(api::get_order))
        .route("/orders/{id}/cancel", post(api::cancel_order))
        .route("/account/profile", put(api::update_profile))
        .route("/account/password", put(api::change_password))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_user,
        ));

    // Admin routes; require_user runs first, then require_admin
    let admin_routes = Router::new()
        // Products
        .route("/admin/products", get(api::admin_list_products))
        .route("/products", post(api::create_product))
        .route(
            "/products/{id}",
            put(api::update_product).delete(api::delete_product),
        )
        .route("/products/{id}/stock", put(api::set_product_stock))
        // Collections
        .route("/collections", post(api::create_collection))
        .route(
            "/collections/{id}",
            put(api::update_collection).delete(api::delete_collection),
        )
        .route("/collections/{id}/products", put(api::set_collection_products))
        // Sales
        .route("/admin/sales", get(api::admin_list_sales))
        .route("/sales", post(api::create_sale))
        .route("/sales/{id}", put(api::update_sale).delete(api::delete_sale))
        // Orders
        .route("/orders/{id}/status", put(api::update_order_status))
        // Users
        .route("/admin/users", get(api::admin_list_users))
        .route(
            "/admin/users/{id}",
            put(api::admin_update_user).delete(api::admin_delete_user),
        )
        // Contact
        .route("/admin/contact", get(api::admin_list_contact))
        .route(
            "/admin/contact/{id}",
            put(api::admin_resolve_contact).delete(api::admin_delete_contact),
        )
        // Settings
        .route("/admin/settings", get(api::admin_list_settings))
        .route(
            "/admin/settings/{key}",
            put(api::admin_put_setting).delete(api::admin_delete_setting),
        )
        // Dashboard
        .route("/admin/stats", get(api::admin_stats))
        .route_layer(middleware::from_fn(auth::require_admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_user,
        ));

    let api_routes = public_routes.merge(user_routes).merge(admin_routes);

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
