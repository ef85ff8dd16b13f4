pub mod company;
pub mod config;
pub mod customers;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod expenses;
pub mod extract;
pub mod health;
pub mod invoices;
pub mod listing;
pub mod party;
pub mod payments;
pub mod reports;
pub mod seed;
pub mod server;
pub mod settings;
pub mod totals;
pub mod util;
pub mod validation;
pub mod vendors;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::db::Db;
use crate::seed::{SeedCounts, SeedReport};

pub use crate::server::build_router;

/// `RUST_LOG` wins over the configured filter.
pub fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn open_database(config: &AppConfig) -> anyhow::Result<Db> {
    Db::open(&config.database)
        .with_context(|| format!("failed to open database {:?}", config.database))
}

pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let db = open_database(&config)?;
    server::serve(&config, db).await
}

pub async fn run_migrations(config: &AppConfig) -> anyhow::Result<i64> {
    let db = open_database(config)?;
    let version = db
        .with_read("schema_version", |conn| {
            Ok(conn.query_row("PRAGMA user_version", [], |r| r.get::<_, i64>(0))?)
        })
        .await?;
    tracing::info!(version, "database schema up to date");
    Ok(version)
}

pub async fn run_seed(config: &AppConfig, counts: SeedCounts) -> anyhow::Result<SeedReport> {
    let db = open_database(config)?;
    let report = db
        .with_write("seed", move |conn| {
            let mut rng = rand::thread_rng();
            seed::seed(conn, &counts, &mut rng)
        })
        .await?;
    Ok(report)
}
