//! Public tracking lookup

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{routing::get, Json, Router};
use dsenvios_core::TrackingNumber;

use super::ApiResponse;
use crate::db::Pool;
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::projector::{Projection, TrackingProjector};

pub(crate) async fn lookup(pool: &Pool, numero: &str) -> Result<Projection, ApiError> {
    let tracking_number = TrackingNumber::new(numero)?;
    Ok(TrackingProjector::new(pool).project(&tracking_number).await?)
}

/// GET /api/rastreo/{numero}
async fn track(
    State(state): State<Arc<AppState>>,
    Path(numero): Path<String>,
) -> Result<Json<ApiResponse<Projection>>, ApiError> {
    let projection = lookup(&state.pool, &numero).await?;
    Ok(Json(ApiResponse::ok(projection)))
}

/// Tracking routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/rastreo/{numero}", get(track))
}
