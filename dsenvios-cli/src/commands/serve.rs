//! HTTP server command

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use dsenvios_core::AppConfig;
use dsenvios_server::{migrations, run_server, MemoryBackend, Pool, PoolOptions, ServerConfig};

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (default: server.host:server.port from config, 127.0.0.1:3005)
    #[arg(long, short = 'b')]
    pub bind: Option<SocketAddr>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Serve from an in-process store instead of Postgres (data is lost on exit)
    #[arg(long)]
    pub in_memory: bool,

    /// Skip schema migrations at startup
    #[arg(long)]
    pub no_migrate: bool,
}

/// Resolve `host:port` from config; hostnames such as `localhost` are allowed.
async fn resolve_bind_addr(addr: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(addr)
        .await
        .with_context(|| format!("invalid server address '{}'", addr))?
        .next()
        .with_context(|| format!("server address '{}' did not resolve", addr))
}

pub async fn run_serve(args: ServeArgs, config: AppConfig) -> Result<()> {
    let bind_addr = match args.bind {
        Some(addr) => addr,
        None => resolve_bind_addr(&config.server.bind_addr()).await?,
    };

    let pool = if args.in_memory {
        tracing::warn!("Serving from the in-memory store; nothing will be persisted");
        Pool::open(MemoryBackend::new(), PoolOptions::from_config(&config.database)).await?
    } else {
        super::connect(&config).await?
    };

    if !args.no_migrate {
        migrations::run(&pool).await.context("migration failed")?;
    }

    tracing::info!(status = ?pool.status(), "Starting dsenvios server on {}", bind_addr);

    run_server(
        pool,
        ServerConfig {
            bind_addr,
            cors_permissive: args.cors_permissive || config.server.cors_permissive,
        },
    )
    .await
    .context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_address_accepts_hostnames() {
        let addr = resolve_bind_addr("localhost:3005").await.unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 3005);

        let addr = resolve_bind_addr("127.0.0.1:8080").await.unwrap();
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 8080)));

        assert!(resolve_bind_addr("no port here").await.is_err());
    }
}
