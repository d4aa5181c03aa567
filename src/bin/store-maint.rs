//! Store maintenance CLI.
//!
//! Runs data jobs against the same database and index the server uses.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use garment_store::db::{self, Repository};
use garment_store::maintenance::{self, SeedData};
use garment_store::search::SearchIndex;

#[derive(Parser)]
#[command(name = "store-maint")]
#[command(about = "Maintenance jobs for the garment store backend")]
struct Args {
    /// SQLite database file
    #[arg(long, env = "STORE_DB_PATH", default_value = "./data/store.sqlite")]
    db_path: PathBuf,

    /// Product search index directory
    #[arg(long, env = "STORE_INDEX_PATH", default_value = "./data/index")]
    index_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load collections, products and settings from a JSON file
    Seed {
        #[arg(long)]
        file: PathBuf,
    },
    /// Rewrite stored size labels into canonical sizes
    NormalizeSizes,
    /// Recompute order totals from their items
    RecalcOrders,
    /// Give an existing account the admin role
    Promote {
        #[arg(long)]
        email: String,
    },
    /// Set the key used to claim admin access
    SetAdminKey {
        #[arg(long)]
        key: String,
    },
    /// Rebuild the product search index
    Reindex,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let pool = db::init_database(&args.db_path)
        .await
        .with_context(|| format!("opening database {}", args.db_path.display()))?;
    let repo = Repository::new(pool);

    let result = run(&repo, &args).await;
    repo.pool().close().await;
    result
}

async fn run(repo: &Repository, args: &Args) -> anyhow::Result<()> {
    match &args.command {
        Command::Seed { file } => {
            let raw = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let data: SeedData = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", file.display()))?;
            let report = maintenance::seed(repo, &data).await?;
            println!(
                "Created {} collections, {} products, {} settings; skipped {}",
                report.collections, report.products, report.settings, report.skipped
            );
            if report.collections + report.products > 0 {
                reindex(repo, &args.index_path).await?;
            }
        }
        Command::NormalizeSizes => {
            let changed = maintenance::normalize_sizes(repo).await?;
            println!("Normalized sizes on {} products", changed);
        }
        Command::RecalcOrders => {
            let fixed = maintenance::recalc_orders(repo).await?;
            println!("Fixed totals on {} orders", fixed);
        }
        Command::Promote { email } => {
            let user = maintenance::promote(repo, email).await?;
            println!("{} is now an admin", user.email);
        }
        Command::SetAdminKey { key } => {
            maintenance::set_admin_key(repo, key).await?;
            println!("Admin access key updated");
        }
        Command::Reindex => reindex(repo, &args.index_path).await?,
    }
    Ok(())
}

async fn reindex(repo: &Repository, index_path: &std::path::Path) -> anyhow::Result<()> {
    let search = SearchIndex::open(index_path)
        .with_context(|| format!("opening index {}", index_path.display()))?;
    let count = maintenance::reindex(repo, &search).await?;
    println!("Indexed {} products", count);
    Ok(())
}
