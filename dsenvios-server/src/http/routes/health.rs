//! Health check endpoint

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::db::{PoolStatus, QueryExecutor, Statement};
use crate::http::server::AppState;

const PING: &str = "/* health.ping */ SELECT 1 AS ok";

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub pool: PoolStatus,
}

/// GET /api/health
async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let ping = Statement::new(PING).with_timeout(Duration::from_secs(2));
    let database_up = match QueryExecutor::new(&state.pool).execute(&ping).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, "health check could not reach the database");
            false
        }
    };

    let (code, status, database) = if database_up {
        (StatusCode::OK, "ok", "up")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded", "down")
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            database,
            pool: state.pool.status(),
        }),
    )
}

/// Health routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/health", get(health))
}

#[cfg(test)]
mod tests {
    use crate::http::server::tests::{read_json, test_app};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn get() -> Request<Body> {
        Request::builder().uri("/api/health").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_pool() {
        let (_, _, app) = test_app();
        let response = app.oneshot(get()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = read_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "up");
        assert_eq!(body["pool"]["capacity"], 10);
        assert_eq!(body["pool"]["leased"], 0);
        assert_eq!(body["pool"]["idle"], 1);
    }

    #[tokio::test]
    async fn health_degrades_when_database_is_down() {
        let (backend, _, app) = test_app();
        backend.set_offline(true);

        let response = app.oneshot(get()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(read_json(response).await["database"], "down");
    }
}
