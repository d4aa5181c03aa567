//! Integration tests for the storefront backend.

use std::sync::Arc;

use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::search::SearchIndex;
use crate::{create_router, AppState};

const SERVICE_KEY: &str = "test-service-key";

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");
        let index_path = temp_dir.path().join("index");

        // Initialize database
        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));

        // Initialize search index
        let search = Arc::new(SearchIndex::open(&index_path).expect("Failed to init search"));

        // Create config
        let config = Config {
            db_path,
            index_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            jwt_secret: "integration-test-secret".to_string(),
            jwt_secret_generated: false,
            token_ttl_hours: 1,
            api_key: Some(SERVICE_KEY.to_string()),
            shipping_flat_cents: 500,
            free_shipping_over_cents: Some(10_000),
        };

        let state = AppState {
            repo,
            search,
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        TestFixture {
            client: Client::new(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Request authenticated with the service key.
    fn admin(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("x-api-key", SERVICE_KEY)
    }

    /// Request authenticated with a session token.
    fn as_user(&self, token: &str, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(token)
    }

    /// Register an account and return `(token, user id)`.
    async fn register(&self, email: &str) -> (String, String) {
        let resp = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "email": email,
                "password": "correct-horse",
                "name": "Test Shopper"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        (
            body["data"]["token"].as_str().unwrap().to_string(),
            body["data"]["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    async fn create_product(&self, body: Value) -> Value {
        let resp = self
            .admin(reqwest::Method::POST, "/api/products")
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["data"].clone()
    }

    async fn product(&self, id: &str) -> Value {
        let resp = self
            .client
            .get(self.url(&format!("/api/products/{}", id)))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["data"].clone()
    }
}

fn kurta() -> Value {
    json!({
        "name": "Cotton Kurta",
        "category": "kurtas",
        "priceCents": 2500,
        "description": "Block printed cotton kurta",
        "sizes": [{ "size": "M", "stock": 3 }, { "size": "large", "stock": 1 }],
        "tags": ["cotton", "summer"]
    })
}

fn saree() -> Value {
    json!({
        "name": "Banarasi Silk Saree",
        "category": "sarees",
        "priceCents": 12000,
        "compareAtCents": 15000,
        "sizes": [{ "size": "free size", "stock": 5 }],
        "tags": ["silk", "wedding"]
    })
}

fn address() -> Value {
    json!({
        "fullName": "Asha Rao",
        "line1": "12 MG Road",
        "city": "Bengaluru",
        "postalCode": "560001",
        "country": "IN"
    })
}

fn stock_of(product: &Value, size: &str) -> i64 {
    product["sizes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["size"] == size)
        .map(|s| s["stock"].as_i64().unwrap())
        .unwrap_or(0)
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_register_login_me() {
    let fixture = TestFixture::new().await;
    let (token, user_id) = fixture.register("Asha@Example.com").await;

    let resp = fixture
        .as_user(&token, reqwest::Method::GET, "/api/auth/me")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["id"], user_id.as_str());
    assert_eq!(body["data"]["email"], "asha@example.com");
    assert_eq!(body["data"]["role"], "customer");

    // Duplicate e-mail
    let resp = fixture
        .client
        .post(fixture.url("/api/auth/register"))
        .json(&json!({ "email": "asha@example.com", "password": "another-pass", "name": "Asha" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // Wrong password and unknown account look the same
    for (email, password) in [("asha@example.com", "wrong-pass"), ("nobody@example.com", "correct-horse")] {
        let resp = fixture
            .client
            .post(fixture.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["message"], "Invalid email or password");
    }

    let resp = fixture
        .client
        .post(fixture.url("/api/auth/login"))
        .json(&json!({ "email": "ASHA@example.com", "password": "correct-horse" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_register_validation() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/auth/register"))
        .json(&json!({ "email": "a@example.com", "password": "short", "name": "A" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_auth_guards() {
    let fixture = TestFixture::new().await;
    let (token, _) = fixture.register("shopper@example.com").await;

    // No credentials
    let resp = fixture
        .client
        .get(fixture.url("/api/orders"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Garbage token
    let resp = fixture
        .as_user("not-a-token", reqwest::Method::GET, "/api/auth/me")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Wrong service key
    let resp = fixture
        .client
        .get(fixture.url("/api/admin/stats"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Customers cannot reach admin routes
    let resp = fixture
        .as_user(&token, reqwest::Method::POST, "/api/products")
        .json(&kurta())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // The service key can
    let resp = fixture
        .admin(reqwest::Method::GET, "/api/admin/stats")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_product_crud_and_filters() {
    let fixture = TestFixture::new().await;

    let created = fixture.create_product(kurta()).await;
    assert_eq!(created["slug"], "cotton-kurta");
    assert_eq!(stock_of(&created, "L"), 1);
    fixture.create_product(saree()).await;

    // Fetch by slug
    let by_slug = fixture.product("cotton-kurta").await;
    assert_eq!(by_slug["id"], created["id"]);

    // Price filter in cents
    let resp = fixture
        .client
        .get(fixture.url("/api/products?minPrice=5000&sort=price_desc"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["category"], "sarees");

    // Size filter accepts aliases
    let resp = fixture
        .client
        .get(fixture.url("/api/products?size=medium"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["name"], "Cotton Kurta");

    // Unknown sort is rejected
    let resp = fixture
        .client
        .get(fixture.url("/api/products?sort=random"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Deactivated products disappear from the storefront
    let id = created["id"].as_str().unwrap();
    let resp = fixture
        .admin(reqwest::Method::PUT, &format!("/api/products/{}", id))
        .json(&json!({ "active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/products/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = fixture
        .admin(reqwest::Method::GET, "/api/admin/products")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    // Delete
    let resp = fixture
        .admin(reqwest::Method::DELETE, &format!("/api/products/{}", id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let resp = fixture
        .admin(reqwest::Method::DELETE, &format!("/api/products/{}", id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_product_validation() {
    let fixture = TestFixture::new().await;

    let mut bad_size = kurta();
    bad_size["sizes"] = json!([{ "size": "gigantic", "stock": 1 }]);
    let resp = fixture
        .admin(reqwest::Method::POST, "/api/products")
        .json(&bad_size)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let mut bad_price = kurta();
    bad_price["compareAtCents"] = json!(1000);
    let resp = fixture
        .admin(reqwest::Method::POST, "/api/products")
        .json(&bad_price)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_product_version_mismatch() {
    let fixture = TestFixture::new().await;
    let product = fixture.create_product(kurta()).await;
    let id = product["id"].as_str().unwrap();
    let version = product["version"].as_i64().unwrap();

    let resp = fixture
        .admin(reqwest::Method::PUT, &format!("/api/products/{}", id))
        .json(&json!({ "priceCents": 2700, "expectedVersion": version }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Stale version
    let resp = fixture
        .admin(reqwest::Method::PUT, &format!("/api/products/{}", id))
        .json(&json!({ "priceCents": 2900, "expectedVersion": version }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VERSION_MISMATCH");
    assert_eq!(body["error"]["details"]["currentVersion"], version + 1);

    assert_eq!(fixture.product(id).await["priceCents"], 2700);
}

#[tokio::test]
async fn test_search_products() {
    let fixture = TestFixture::new().await;
    fixture.create_product(kurta()).await;
    let silk = fixture.create_product(saree()).await;

    let resp = fixture
        .client
        .get(fixture.url("/api/products/search?q=silk"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let results = body["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["product"]["id"], silk["id"]);

    // Collection names are searchable once membership is set
    let resp = fixture
        .admin(reqwest::Method::POST, "/api/collections")
        .json(&json!({ "name": "Festive Edit" }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let collection_id = body["data"]["id"].as_str().unwrap().to_string();

    let resp = fixture
        .admin(
            reqwest::Method::PUT,
            &format!("/api/collections/{}/products", collection_id),
        )
        .json(&json!({ "productIds": [silk["id"]] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .client
        .get(fixture.url("/api/products/search?q=festive"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["total"], 1);

    // Blank query finds nothing
    let resp = fixture
        .client
        .get(fixture.url("/api/products/search?q="))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn test_collection_listing_by_slug() {
    let fixture = TestFixture::new().await;
    let product = fixture.create_product(kurta()).await;

    let resp = fixture
        .admin(reqwest::Method::POST, "/api/collections")
        .json(&json!({ "name": "Summer Cottons" }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let collection_id = body["data"]["id"].as_str().unwrap().to_string();

    fixture
        .admin(
            reqwest::Method::PUT,
            &format!("/api/collections/{}/products", collection_id),
        )
        .json(&json!({ "productIds": [product["id"]] }))
        .send()
        .await
        .unwrap();

    let resp = fixture
        .client
        .get(fixture.url("/api/collections/summer-cottons"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["productCount"], 1);
    assert_eq!(body["data"]["products"][0]["id"], product["id"]);

    let resp = fixture
        .client
        .get(fixture.url("/api/products?collection=summer-cottons"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["total"], 1);

    // Unknown products are rejected
    let resp = fixture
        .admin(
            reqwest::Method::PUT,
            &format!("/api/collections/{}/products", collection_id),
        )
        .json(&json!({ "productIds": ["missing"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_checkout_decrements_stock() {
    let fixture = TestFixture::new().await;
    let (token, user_id) = fixture.register("buyer@example.com").await;
    let product = fixture.create_product(kurta()).await;
    let id = product["id"].as_str().unwrap();

    let resp = fixture
        .as_user(&token, reqwest::Method::POST, "/api/orders")
        .json(&json!({
            "items": [{ "productId": id, "size": "m", "quantity": 2 }],
            "shippingAddress": address()
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let order = &body["data"];
    assert_eq!(order["status"], "pending");
    assert_eq!(order["userId"], user_id.as_str());
    assert_eq!(order["customerEmail"], "buyer@example.com");
    assert_eq!(order["subtotalCents"], 5000);
    assert_eq!(order["shippingCents"], 500);
    assert_eq!(order["totalCents"], 5500);
    assert_eq!(order["items"][0]["size"], "M");
    assert!(order["orderNumber"].as_str().unwrap().starts_with("ORD-"));

    assert_eq!(stock_of(&fixture.product(id).await, "M"), 1);

    // The customer sees their order; others do not
    let order_id = order["id"].as_str().unwrap();
    let resp = fixture
        .as_user(&token, reqwest::Method::GET, "/api/orders")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (other, _) = fixture.register("other@example.com").await;
    let resp = fixture
        .as_user(&other, reqwest::Method::GET, &format!("/api/orders/{}", order_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_checkout_insufficient_stock_rolls_back() {
    let fixture = TestFixture::new().await;
    let (token, _) = fixture.register("buyer@example.com").await;
    let kurta = fixture.create_product(kurta()).await;
    let saree = fixture.create_product(saree()).await;
    let kurta_id = kurta["id"].as_str().unwrap();
    let saree_id = saree["id"].as_str().unwrap();

    let resp = fixture
        .as_user(&token, reqwest::Method::POST, "/api/orders")
        .json(&json!({
            "items": [
                { "productId": saree_id, "size": "FREE", "quantity": 2 },
                { "productId": kurta_id, "size": "L", "quantity": 2 }
            ],
            "shippingAddress": address()
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INSUFFICIENT_STOCK");
    assert_eq!(body["error"]["details"]["available"], 1);

    // The first line's decrement was rolled back
    assert_eq!(stock_of(&fixture.product(saree_id).await, "FREE"), 5);
    assert_eq!(stock_of(&fixture.product(kurta_id).await, "L"), 1);

    let resp = fixture
        .admin(reqwest::Method::GET, "/api/orders")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_checkout_validation() {
    let fixture = TestFixture::new().await;
    let (token, _) = fixture.register("buyer@example.com").await;
    let product = fixture.create_product(kurta()).await;

    // Empty cart
    let resp = fixture
        .as_user(&token, reqwest::Method::POST, "/api/orders")
        .json(&json!({ "items": [], "shippingAddress": address() }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Size the product does not come in
    let resp = fixture
        .as_user(&token, reqwest::Method::POST, "/api/orders")
        .json(&json!({
            "items": [{ "productId": product["id"], "size": "XXL", "quantity": 1 }],
            "shippingAddress": address()
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Missing address line
    let mut incomplete = address();
    incomplete["city"] = json!("  ");
    let resp = fixture
        .as_user(&token, reqwest::Method::POST, "/api/orders")
        .json(&json!({
            "items": [{ "productId": product["id"], "size": "M", "quantity": 1 }],
            "shippingAddress": incomplete
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_order_status_transitions_restore_stock() {
    let fixture = TestFixture::new().await;
    let (token, _) = fixture.register("buyer@example.com").await;
    let product = fixture.create_product(kurta()).await;
    let id = product["id"].as_str().unwrap();

    let resp = fixture
        .as_user(&token, reqwest::Method::POST, "/api/orders")
        .json(&json!({
            "items": [{ "productId": id, "size": "M", "quantity": 3 }],
            "shippingAddress": address()
        }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let order_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(stock_of(&fixture.product(id).await, "M"), 0);

    let set_status = |status: &str| {
        fixture
            .admin(reqwest::Method::PUT, &format!("/api/orders/{}/status", order_id))
            .json(&json!({ "status": status }))
    };

    // Skipping ahead is refused
    let resp = set_status("shipped").send().await.unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");

    for status in ["confirmed", "processing"] {
        let resp = set_status(status).send().await.unwrap();
        assert_eq!(resp.status(), 200);
    }

    // Too late for the customer to cancel
    let resp = fixture
        .as_user(&token, reqwest::Method::POST, &format!("/api/orders/{}/cancel", order_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // The admin can still cancel, which puts the stock back
    let resp = set_status("cancelled").send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(stock_of(&fixture.product(id).await, "M"), 3);

    // Cancelled is terminal
    let resp = set_status("confirmed").send().await.unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn test_customer_cancel() {
    let fixture = TestFixture::new().await;
    let (token, _) = fixture.register("buyer@example.com").await;
    let product = fixture.create_product(saree()).await;
    let id = product["id"].as_str().unwrap();

    let resp = fixture
        .as_user(&token, reqwest::Method::POST, "/api/orders")
        .json(&json!({
            "items": [{ "productId": id, "size": "M", "quantity": 1 }],
            "shippingAddress": address()
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let order_id = body["data"]["id"].as_str().unwrap().to_string();
    // Free-size products match any requested size
    assert_eq!(body["data"]["items"][0]["size"], "FREE");
    assert_eq!(stock_of(&fixture.product(id).await, "FREE"), 4);

    let resp = fixture
        .as_user(&token, reqwest::Method::POST, &format!("/api/orders/{}/cancel", order_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(stock_of(&fixture.product(id).await, "FREE"), 5);

    let resp = fixture
        .as_user(&token, reqwest::Method::GET, "/api/orders?status=cancelled")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_quote_with_sale_code() {
    let fixture = TestFixture::new().await;
    let product = fixture.create_product(kurta()).await;

    let resp = fixture
        .admin(reqwest::Method::POST, "/api/sales")
        .json(&json!({
            "name": "Festive Ten",
            "code": "FEST10",
            "kind": "percentage",
            "value": 10
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let cart = |code: Option<&str>| {
        json!({
            "items": [{ "productId": product["id"], "size": "M", "quantity": 2 }],
            "code": code
        })
    };

    // Without the code the sale does not apply
    let resp = fixture
        .client
        .post(fixture.url("/api/cart/quote"))
        .json(&cart(None))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["discountCents"], 0);
    assert_eq!(body["data"]["totalCents"], 5500);
    assert_eq!(body["data"]["lines"][0]["available"], 3);

    let resp = fixture
        .client
        .post(fixture.url("/api/cart/quote"))
        .json(&cart(Some("fest10")))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["subtotalCents"], 5000);
    assert_eq!(body["data"]["discountCents"], 500);
    assert_eq!(body["data"]["shippingCents"], 500);
    assert_eq!(body["data"]["totalCents"], 5000);
    assert_eq!(body["data"]["appliedSale"]["name"], "Festive Ten");

    // The storefront sees the sale but not its code
    let resp = fixture
        .client
        .get(fixture.url("/api/sales"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"][0]["requiresCode"], true);
    assert!(body["data"][0].get("code").is_none());
}

#[tokio::test]
async fn test_sale_validation() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .admin(reqwest::Method::POST, "/api/sales")
        .json(&json!({ "name": "Too much", "kind": "percentage", "value": 150 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .admin(reqwest::Method::POST, "/api/sales")
        .json(&json!({
            "name": "Backwards",
            "kind": "fixed",
            "value": 500,
            "startsAt": "2026-02-01T00:00:00Z",
            "endsAt": "2026-01-01T00:00:00Z"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_settings_secret_is_hidden() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .admin(reqwest::Method::PUT, "/api/admin/settings/admin_access_key")
        .json(&json!({ "value": "short" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .admin(reqwest::Method::PUT, "/api/admin/settings/admin_access_key")
        .json(&json!({ "value": "open-sesame-1234" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["value"], "********");

    // Public reads cannot tell the secret exists
    let resp = fixture
        .client
        .get(fixture.url("/api/settings/admin_access_key"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = fixture
        .admin(reqwest::Method::PUT, "/api/admin/settings/store_banner")
        .json(&json!({ "value": { "text": "Diwali sale" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .client
        .get(fixture.url("/api/settings/store_banner"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["value"]["text"], "Diwali sale");

    let resp = fixture
        .admin(reqwest::Method::GET, "/api/admin/settings")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let secret = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["key"] == "admin_access_key")
        .unwrap()
        .clone();
    assert_eq!(secret["value"], "********");

    // Bad key shape
    let resp = fixture
        .admin(reqwest::Method::PUT, "/api/admin/settings/Bad-Key")
        .json(&json!({ "value": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_admin_access_and_last_admin() {
    let fixture = TestFixture::new().await;
    let (token, user_id) = fixture.register("owner@example.com").await;

    // No key configured yet
    let resp = fixture
        .as_user(&token, reqwest::Method::POST, "/api/auth/admin-access")
        .json(&json!({ "key": "anything-at-all" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    fixture
        .admin(reqwest::Method::PUT, "/api/admin/settings/admin_access_key")
        .json(&json!({ "value": "open-sesame-1234" }))
        .send()
        .await
        .unwrap();

    let resp = fixture
        .as_user(&token, reqwest::Method::POST, "/api/auth/admin-access")
        .json(&json!({ "key": "wrong-key-entirely" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .as_user(&token, reqwest::Method::POST, "/api/auth/admin-access")
        .json(&json!({ "key": "open-sesame-1234" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["user"]["role"], "admin");

    // The promoted account reaches admin routes with its existing token
    let resp = fixture
        .as_user(&token, reqwest::Method::GET, "/api/admin/users")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Self-deletion and demoting the last admin are refused
    let resp = fixture
        .as_user(&token, reqwest::Method::DELETE, &format!("/api/admin/users/{}", user_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .admin(reqwest::Method::PUT, &format!("/api/admin/users/{}", user_id))
        .json(&json!({ "role": "customer" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let resp = fixture
        .admin(reqwest::Method::DELETE, &format!("/api/admin/users/{}", user_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn test_contact_submission() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/contact/submit"))
        .json(&json!({ "name": "Meera", "email": "not-an-email", "message": "Hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .client
        .post(fixture.url("/api/contact/submit"))
        .json(&json!({ "name": "Meera", "email": "meera@example.com", "message": "x".repeat(5001) }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .client
        .post(fixture.url("/api/contact/submit"))
        .json(&json!({
            "name": "Meera",
            "email": "meera@example.com",
            "subject": "Alterations",
            "message": "Do you offer blouse stitching?"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["resolved"], false);

    let resp = fixture
        .admin(reqwest::Method::PUT, &format!("/api/admin/contact/{}", id))
        .json(&json!({ "resolved": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .admin(reqwest::Method::GET, "/api/admin/contact?unresolved=true")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_change_password() {
    let fixture = TestFixture::new().await;
    let (token, _) = fixture.register("buyer@example.com").await;

    let resp = fixture
        .as_user(&token, reqwest::Method::PUT, "/api/account/password")
        .json(&json!({ "currentPassword": "not-my-password", "newPassword": "brand-new-pass" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .as_user(&token, reqwest::Method::PUT, "/api/account/password")
        .json(&json!({ "currentPassword": "correct-horse", "newPassword": "brand-new-pass" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .client
        .post(fixture.url("/api/auth/login"))
        .json(&json!({ "email": "buyer@example.com", "password": "brand-new-pass" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_home_and_stats() {
    let fixture = TestFixture::new().await;
    let (token, _) = fixture.register("buyer@example.com").await;
    let kurta = fixture.create_product(kurta()).await;
    let saree = fixture.create_product(saree()).await;

    fixture
        .admin(reqwest::Method::PUT, "/api/admin/settings/homepage_featured")
        .json(&json!({ "value": [saree["id"], "missing-id"] }))
        .send()
        .await
        .unwrap();

    let resp = fixture
        .client
        .get(fixture.url("/api/home"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["featured"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["featured"][0]["id"], saree["id"]);
    assert_eq!(body["data"]["newArrivals"].as_array().unwrap().len(), 2);

    fixture
        .as_user(&token, reqwest::Method::POST, "/api/orders")
        .json(&json!({
            "items": [{ "productId": kurta["id"], "size": "L", "quantity": 1 }],
            "shippingAddress": address()
        }))
        .send()
        .await
        .unwrap();

    let resp = fixture
        .admin(reqwest::Method::GET, "/api/admin/stats")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let stats = &body["data"];
    assert_eq!(stats["productCount"], 2);
    assert_eq!(stats["ordersByStatus"]["pending"], 1);
    assert_eq!(stats["ordersByStatus"]["shipped"], 0);
    assert_eq!(stats["revenueCents"], 3000);
    assert_eq!(stats["customerCount"], 1);
    // Kurta L is sold out, kurta M has 3 left
    let low: Vec<&Value> = stats["lowStock"].as_array().unwrap().iter().collect();
    assert!(low.iter().any(|e| e["size"] == "L" && e["stock"] == 0));
}

#[tokio::test]
async fn test_search_offset_is_bounded() {
    let fixture = TestFixture::new().await;
    fixture.create_product(saree()).await;

    for offset in ["18446744073709551615", "100000000000", "10001"] {
        let resp = fixture
            .client
            .get(fixture.url(&format!("/api/products/search?q=silk&offset={}", offset)))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    let resp = fixture
        .client
        .get(fixture.url("/api/products/search?q=silk&offset=10000"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["total"], 1);
    assert!(body["data"]["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_quote_rejects_oversized_quantities() {
    let fixture = TestFixture::new().await;
    let product = fixture.create_product(kurta()).await;

    let quote = |quantity: i64| {
        fixture
            .client
            .post(fixture.url("/api/cart/quote"))
            .json(&json!({
                "items": [{ "productId": product["id"], "size": "M", "quantity": quantity }]
            }))
            .send()
    };

    for quantity in [i64::MAX, 101, 0] {
        let resp = quote(quantity).await.unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    let resp = quote(100).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["subtotalCents"], 250_000);
}

#[tokio::test]
async fn test_set_product_stock() {
    let fixture = TestFixture::new().await;
    let product = fixture.create_product(kurta()).await;
    let id = product["id"].as_str().unwrap();
    let version = product["version"].as_i64().unwrap();

    let resp = fixture
        .admin(reqwest::Method::PUT, &format!("/api/products/{}/stock", id))
        .json(&json!({ "sizes": [{ "size": "s", "stock": 4 }, { "size": "XL", "stock": 2 }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["version"], version + 1);

    // The stock table is replaced, not merged
    let stored = fixture.product(id).await;
    assert_eq!(stock_of(&stored, "S"), 4);
    assert_eq!(stock_of(&stored, "XL"), 2);
    assert_eq!(stock_of(&stored, "M"), 0);

    let resp = fixture
        .admin(reqwest::Method::PUT, &format!("/api/products/{}/stock", id))
        .json(&json!({ "sizes": [{ "size": "44", "stock": 1 }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .admin(reqwest::Method::PUT, "/api/products/missing/stock")
        .json(&json!({ "sizes": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Customers cannot touch stock
    let (token, _) = fixture.register("shopper@example.com").await;
    let resp = fixture
        .as_user(&token, reqwest::Method::PUT, &format!("/api/products/{}/stock", id))
        .json(&json!({ "sizes": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_size_recommendation() {
    let fixture = TestFixture::new().await;
    let product = fixture.create_product(kurta()).await;
    let slug = product["slug"].as_str().unwrap();

    let recommend = |query: &str| {
        fixture
            .client
            .get(fixture.url(&format!(
                "/api/products/{}/size-recommendation{}",
                slug, query
            )))
            .send()
    };

    let resp = recommend("?chest=37").await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["recommended"], "M");
    assert_eq!(body["data"]["available"].as_array().unwrap().len(), 2);

    let body: Value = recommend("?chest=39.5").await.unwrap().json().await.unwrap();
    assert_eq!(body["data"]["recommended"], "L");

    // Nothing in stock is big enough
    let body: Value = recommend("?chest=48").await.unwrap().json().await.unwrap();
    assert!(body["data"]["recommended"].is_null());

    let resp = recommend("").await.unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let resp = fixture
        .client
        .get(fixture.url("/api/products/missing/size-recommendation?chest=38"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_sale_update_and_delete() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .admin(reqwest::Method::POST, "/api/collections")
        .json(&json!({ "name": "Festive Edit" }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let collection_id = body["data"]["id"].as_str().unwrap().to_string();

    let resp = fixture
        .admin(reqwest::Method::POST, "/api/sales")
        .json(&json!({
            "name": "Festive Ten",
            "description": "Ten percent off the festive edit",
            "code": "FEST10",
            "kind": "percentage",
            "value": 10,
            "collectionId": collection_id,
            "minOrderCents": 5000
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let sale = body["data"].clone();
    let sale_id = sale["id"].as_str().unwrap().to_string();

    // Admin listing carries the code; the storefront listing does not
    let resp = fixture
        .admin(reqwest::Method::GET, "/api/admin/sales")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"][0]["code"], "FEST10");

    let resp = fixture
        .client
        .get(fixture.url("/api/sales"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"][0].get("code").is_none());

    let resp = fixture
        .client
        .get(fixture.url("/api/admin/sales"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Empty strings and a zero minimum clear the optional rules
    let resp = fixture
        .admin(reqwest::Method::PUT, &format!("/api/sales/{}", sale_id))
        .json(&json!({
            "description": "",
            "code": "",
            "collectionId": "",
            "minOrderCents": 0,
            "value": 15,
            "expectedVersion": sale["version"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let updated = body["data"].clone();
    assert_eq!(updated["value"], 15);
    assert_eq!(updated["name"], "Festive Ten");
    assert!(updated.get("description").is_none());
    assert!(updated.get("code").is_none());
    assert!(updated.get("collectionId").is_none());
    assert!(updated.get("minOrderCents").is_none());

    // A stale version is refused
    let resp = fixture
        .admin(reqwest::Method::PUT, &format!("/api/sales/{}", sale_id))
        .json(&json!({ "value": 20, "expectedVersion": sale["version"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let resp = fixture
        .admin(reqwest::Method::PUT, &format!("/api/sales/{}", sale_id))
        .json(&json!({ "collectionId": "missing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .admin(reqwest::Method::DELETE, &format!("/api/sales/{}", sale_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .admin(reqwest::Method::DELETE, &format!("/api/sales/{}", sale_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = fixture
        .admin(reqwest::Method::GET, "/api/admin/sales")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_collection_update_and_delete() {
    let fixture = TestFixture::new().await;
    let product = fixture.create_product(kurta()).await;

    let resp = fixture
        .admin(reqwest::Method::POST, "/api/collections")
        .json(&json!({ "name": "Summer Cottons", "description": "Light weaves" }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let collection = body["data"].clone();
    let collection_id = collection["id"].as_str().unwrap().to_string();

    fixture
        .admin(
            reqwest::Method::PUT,
            &format!("/api/collections/{}/products", collection_id),
        )
        .json(&json!({ "productIds": [product["id"]] }))
        .send()
        .await
        .unwrap();

    // Renaming reindexes members under the new name
    let resp = fixture
        .admin(reqwest::Method::PUT, &format!("/api/collections/{}", collection_id))
        .json(&json!({ "name": "Monsoon Picks", "description": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["name"], "Monsoon Picks");
    assert!(body["data"].get("description").is_none());
    assert_eq!(body["data"]["productCount"], 1);

    let resp = fixture
        .client
        .get(fixture.url("/api/products/search?q=monsoon"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["total"], 1);

    let resp = fixture
        .admin(reqwest::Method::PUT, &format!("/api/collections/{}", collection_id))
        .json(&json!({ "name": "Stale", "expectedVersion": collection["version"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // A sale scoped to the collection blocks deletion
    let resp = fixture
        .admin(reqwest::Method::POST, "/api/sales")
        .json(&json!({
            "name": "Monsoon Five",
            "kind": "percentage",
            "value": 5,
            "collectionId": collection_id
        }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let sale_id = body["data"]["id"].as_str().unwrap().to_string();

    let resp = fixture
        .admin(reqwest::Method::DELETE, &format!("/api/collections/{}", collection_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "CONFLICT");

    fixture
        .admin(reqwest::Method::DELETE, &format!("/api/sales/{}", sale_id))
        .send()
        .await
        .unwrap();

    let resp = fixture
        .admin(reqwest::Method::DELETE, &format!("/api/collections/{}", collection_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Members drop the collection and its name leaves the index
    assert!(fixture.product(product["id"].as_str().unwrap()).await["collectionIds"]
        .as_array()
        .unwrap()
        .is_empty());

    let resp = fixture
        .client
        .get(fixture.url("/api/products/search?q=monsoon"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["total"], 0);

    let resp = fixture
        .admin(reqwest::Method::DELETE, &format!("/api/collections/{}", collection_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
