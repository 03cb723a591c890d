//! Command implementations for the dsenvios CLI

pub mod config;
pub mod guides;
pub mod migrate;
pub mod serve;

pub use migrate::run_migrate;
pub use serve::run_serve;

use anyhow::{Context, Result};
use dsenvios_core::AppConfig;
use dsenvios_server::{PgConnector, Pool, PoolOptions};

/// Open the Postgres pool described by `config`, checking connectivity first.
pub async fn connect(config: &AppConfig) -> Result<Pool> {
    let db = &config.database;
    Pool::open(PgConnector::from_config(db), PoolOptions::from_config(db))
        .await
        .with_context(|| format!("could not connect to database '{}' at {}:{}", db.database, db.host, db.port))
}
