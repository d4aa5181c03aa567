//! Garment Store Backend
//!
//! Serves the storefront and admin REST API.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use garment_store::config::Config;
use garment_store::db::{self, Repository};
use garment_store::search::SearchIndex;
use garment_store::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Garment Store Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.jwt_secret_generated {
        tracing::warn!(
            "No session secret configured (STORE_JWT_SECRET). Using a random one; sessions end when the server restarts"
        );
    }
    if config.api_key.is_none() {
        tracing::info!("No service key configured (STORE_API_KEY); x-api-key access is disabled");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // Initialize search index
    let search = Arc::new(SearchIndex::open(&config.index_path)?);

    // Build initial search index from database
    tracing::info!("Building search index...");
    let products = repo.list_all_products().await?;
    let collections = repo.list_collections().await?;
    search.rebuild(&products, &collections).await?;

    let bind_addr = config.bind_addr;
    let state = AppState {
        repo,
        search,
        config: Arc::new(config),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
