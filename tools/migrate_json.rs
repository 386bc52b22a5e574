//! Import JSON configuration files into PostgreSQL
//!
//! Usage: cargo run --bin migrate-json
//!
//! Reads role mappings, report access and admin users from DATA_DIR and inserts
//! every record whose key is not already in the database. Existing rows are left
//! as they are, so the import can be repeated. Requires a database configuration.

use anyhow::{Context, Result};
use report_portal::config::Config;
use report_portal::store::{import_missing, FileStore, SqlStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let database = config
        .database
        .as_ref()
        .context("No database configured. Set DATABASE_URL or the DB_* variables")?;

    let sql = SqlStore::connect(database)
        .await
        .context("Failed to connect to database")?;
    sql.migrate().await.context("Failed to apply migrations")?;

    let files = FileStore::new(&config.data_dir);
    println!("Importing from {}", config.data_dir.display());

    let summary = import_missing(&files, &sql).await?;

    println!("  role mappings: {} imported", summary.role_mappings);
    println!("  report access: {} imported", summary.report_access);
    println!("  admin users:   {} imported", summary.admin_users);
    println!("Done. {} records imported.", summary.total());

    Ok(())
}
