//! Axum server setup
//!
//! - Localhost-only CORS by default
//! - Tracing middleware
//! - Graceful shutdown on SIGTERM/Ctrl+C, then the pool is closed

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::routes;
use crate::db::Pool;

/// Origins allowed when CORS is not permissive: local API and Angular dev server.
const LOCAL_ORIGINS: [&str; 4] = [
    "http://localhost:3005",
    "http://127.0.0.1:3005",
    "http://localhost:4200",
    "http://127.0.0.1:4200",
];

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:3005)
    pub bind_addr: SocketAddr,

    /// Allow permissive CORS (default: false = localhost only)
    ///
    /// WARNING: Setting this to true allows any origin.
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3005)),
            cors_permissive: false,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
}

fn cors_layer(permissive: bool) -> CorsLayer {
    if permissive {
        tracing::warn!("CORS: Permissive mode enabled - all origins allowed");
        return CorsLayer::permissive();
    }
    CorsLayer::new()
        .allow_origin(LOCAL_ORIGINS.map(HeaderValue::from_static))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the application router with all routes.
pub fn build_router(state: AppState, cors_permissive: bool) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::guides::router())
        .merge(routes::tracking::router())
        .merge(routes::quotes::router())
        .merge(routes::collections::router())
        .layer(cors_layer(cors_permissive))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Run the HTTP server until a shutdown signal, then close the pool.
///
/// # Example
///
/// ```ignore
/// let pool = Pool::open(PgConnector::from_config(&config.database), options).await?;
/// run_server(pool, ServerConfig::default()).await?;
/// ```
pub async fn run_server(pool: Pool, config: ServerConfig) -> Result<(), ServerError> {
    let app = build_router(AppState { pool: pool.clone() }, config.cors_permissive);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    pool.close().await;
    served?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{MemoryBackend, PoolOptions};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use serde_json::Value;
    use tower::ServiceExt;

    pub(crate) fn test_app() -> (MemoryBackend, Pool, Router) {
        let backend = MemoryBackend::new();
        let pool = Pool::new(backend.clone(), PoolOptions::default());
        let app = build_router(AppState { pool: pool.clone() }, false);
        (backend, pool, app)
    }

    pub(crate) fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub(crate) async fn read_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 3005);
        assert!(!config.cors_permissive);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (_, _, app) = test_app();
        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_allows_local_front_end() {
        let (_, _, app) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header("origin", "http://localhost:4200")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:4200"
        );
    }
}
