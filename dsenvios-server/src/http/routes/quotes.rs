//! Quote endpoints
//!
//! Quotes are priced in `dsenvios-core` and kept in the `quotes` document
//! collection, so the admin panel sees them under `/collection/quotes` too.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use dsenvios_core::{PackageDetails, Quote, QuoteRequest};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::ApiResponse;
use crate::db::repos::{Document, DocumentRepo};
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::models::{CollectionName, Paginated, Pagination, PaginationParams};

const QUOTES: &str = "quotes";

/// Quote form body
#[derive(Debug, Deserialize)]
pub struct QuoteForm {
    pub origen: String,
    pub destino: String,
    pub peso: f64,
    pub alto: Option<f64>,
    pub ancho: Option<f64>,
    pub largo: Option<f64>,
    pub valor_declarado: Option<f64>,
}

impl From<QuoteForm> for QuoteRequest {
    fn from(form: QuoteForm) -> Self {
        QuoteRequest {
            origin: form.origen,
            destination: form.destino,
            package: PackageDetails {
                weight_kg: form.peso,
                length_cm: form.largo,
                width_cm: form.ancho,
                height_cm: form.alto,
                declared_value: form.valor_declarado,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub id: String,
    pub quote: Quote,
}

fn quotes_collection() -> Result<CollectionName, ApiError> {
    Ok(CollectionName::new(QUOTES)?)
}

/// POST /api/cotizar - price a package and record the quote
async fn create_quote(
    State(state): State<Arc<AppState>>,
    Json(form): Json<QuoteForm>,
) -> Result<Json<ApiResponse<QuoteResponse>>, ApiError> {
    let request = QuoteRequest::from(form).validate()?;
    let quote = request.quote();

    let id = Uuid::new_v4().to_string();
    let body = json!({
        "origin": request.origin,
        "destination": request.destination,
        "package_details": request.package,
        "quote": quote,
        "source": "local",
    });
    DocumentRepo::new(&state.pool)
        .create(&quotes_collection()?, &id, body)
        .await?;

    tracing::debug!(quote_id = %id, total = quote.total_cost, "quote recorded");
    Ok(Json(ApiResponse::ok(QuoteResponse { id, quote })))
}

/// GET /api/quotes - recorded quotes, newest first
async fn list_quotes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<Document>>, ApiError> {
    let page = Pagination::from(params);
    Ok(Json(DocumentRepo::new(&state.pool).list(&quotes_collection()?, page).await?))
}

/// Quote routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/cotizar", post(create_quote))
        .route("/api/quotes", get(list_quotes))
}
