use anyhow::{Context, Result};
use dsenvios_core::AppConfig;
use dsenvios_server::migrations;

pub async fn run_migrate(config: &AppConfig) -> Result<()> {
    let pool = super::connect(config).await?;
    let result = migrations::run(&pool).await.context("migration failed");
    pool.close().await;
    result?;
    println!("Schema is up to date ({} statements)", migrations::statements().len());
    Ok(())
}
